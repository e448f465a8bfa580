#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use delivery_core::RuleConfig;
use delivery_events::Broadcaster;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use delivery_api::config::ServerConfig;
use delivery_api::router::build_app_router;
use delivery_api::state::AppState;

pub const TOKEN: &str = "test-token";

/// Build a test `ServerConfig` with short timeouts.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        accept_token: TOKEN.to_string(),
        source_log_path: PathBuf::from("/dev/null"),
        rules: RuleConfig::new("usr_me", vec!["grp_ok".to_string()]),
        subscriber_buffer: 8,
        send_timeout_ms: 500,
        poll_interval_ms: 20,
        ws_ping_interval_secs: 30,
        shutdown_timeout_secs: 1,
    }
}

pub fn test_state() -> AppState {
    let config = test_config();
    AppState {
        broadcaster: Broadcaster::new(config.broadcast_config()),
        config: Arc::new(config),
        shutdown: CancellationToken::new(),
    }
}

/// Build the full application router, as `main.rs` does.
pub fn build_test_app(state: AppState) -> Router {
    build_app_router(state)
}

/// Serve the app on an ephemeral port. Returns the bound address.
pub async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_app_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
