use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;

use crate::auth::RequireToken;
use crate::state::AppState;
use crate::ws::session::{run_session, SessionConfig};

/// HTTP handler that upgrades an authenticated request to WebSocket.
///
/// After the upgrade the connection is registered with the broadcaster and
/// driven by [`run_session`] until either side goes away.
pub async fn ws_handler(
    _auth: RequireToken,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let request_id = crate::request_id(&headers);
    let config = SessionConfig::from(state.config.as_ref());

    ws.on_upgrade(move |socket| async move {
        let subscription = state.broadcaster.register();
        run_session(
            socket,
            subscription,
            state.shutdown.child_token(),
            config,
            request_id,
        )
        .await;
    })
}
