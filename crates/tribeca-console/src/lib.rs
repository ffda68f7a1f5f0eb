//! Operator console.
//!
//! Exposes the message bus to operators over a WebSocket:
//!
//! - `GET /ws`: subscribe to topics (snapshot, then live messages) and
//!   send commands to registered receivers
//! - `GET /metrics`: Prometheus text export
//! - `GET /health`: liveness
//!
//! Optional basic auth guards `/ws` and `/metrics`.

mod config;
mod error;
mod protocol;
mod server;
mod session;

pub use config::ConsoleConfig;
pub use error::{ConsoleError, ConsoleResult};
pub use protocol::{ClientMessage, ServerMessage};
pub use server::{create_router, run_server, AppState, ConnectionLimiter};
pub use session::Session;
