//! Delivery API server library.
//!
//! Exposes the building blocks (config, state, auth, routes, WebSocket
//! sessions) so integration tests and the binary entrypoint share them.

use axum::http::HeaderMap;

pub mod auth;
pub mod config;
pub mod error;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;

/// Header carrying the per-request transaction id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id set by the request-id layer, or `"-"` when absent.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string()
}
