use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use delivery_core::{NestedPath, PredicateChain};
use delivery_events::{connect_to_source, forward_payloads, Broadcaster};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use delivery_api::config::ServerConfig;
use delivery_api::router::build_app_router;
use delivery_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        source = %config.source_log_path.display(),
        owners = config.rules.allow_owner_ids.len(),
        "Loaded server configuration",
    );

    let shutdown = CancellationToken::new();

    // --- Broadcaster ---
    let broadcaster = Broadcaster::new(config.broadcast_config());
    let (inbox_tx, inbox_rx) = mpsc::channel(1);
    let broadcast_handle = tokio::spawn(broadcaster.clone().run(inbox_rx));

    // --- Source pipeline ---
    let chain = Arc::new(PredicateChain::from_config(&config.rules));
    let source = connect_to_source(
        config.source_log_path.clone(),
        config.follower_config(),
        chain,
        NestedPath::default(),
        shutdown.clone(),
    );
    let source_shutdown = shutdown.clone();
    let source_handle = tokio::spawn(async move {
        if let Err(e) = forward_payloads(source, inbox_tx).await {
            tracing::error!(error = %e, "Source failed, shutting down");
            source_shutdown.cancel();
        }
    });
    tracing::info!("Delivery pipeline started");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        broadcaster: broadcaster.clone(),
        shutdown: shutdown.clone(),
    };
    let app = build_app_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().context("Invalid HOST address")?,
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, draining");
    shutdown.cancel();

    let drain = async {
        let _ = source_handle.await;
        let _ = broadcast_handle.await;
    };
    if tokio::time::timeout(config.shutdown_timeout(), drain).await.is_err() {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Delivery pipeline did not drain in time",
        );
    }

    broadcaster.shutdown_all();
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// `RUST_LOG` filter plus a text or JSON (`LOG_FORMAT=json`) fmt layer.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "delivery_api=debug,delivery_events=debug,tower_http=debug".into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for SIGINT, SIGTERM, or an internal shutdown request (a dead
/// source), then cancel `shutdown` so the follower and every session
/// begin winding down.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
        () = shutdown.cancelled() => {
            tracing::info!("Shutdown requested internally");
        }
    }

    shutdown.cancel();
}
