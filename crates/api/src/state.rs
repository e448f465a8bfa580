use std::sync::Arc;

use delivery_events::Broadcaster;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Fan-out hub every WebSocket session registers with.
    pub broadcaster: Broadcaster,
    /// Root shutdown token; sessions watch child tokens of it.
    pub shutdown: CancellationToken,
}
