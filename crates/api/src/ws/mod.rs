//! WebSocket delivery sessions.
//!
//! Provides the HTTP upgrade handler and the per-connection session that
//! relays broadcast payloads to one client.

mod handler;
mod session;

pub use handler::ws_handler;
pub use session::{run_session, SessionConfig};
