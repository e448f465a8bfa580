pub mod health;
pub mod subscribers;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the route tree.
///
/// ```text
/// /health          GET   liveness + subscriber count (no auth)
/// /ws              GET   WebSocket delivery stream (token)
/// /subscribers     GET   connected subscriber list (token)
/// ```
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .route("/ws", get(ws::ws_handler))
        .route("/subscribers", get(subscribers::list_subscribers))
}
