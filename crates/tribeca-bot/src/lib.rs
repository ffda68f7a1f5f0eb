//! Market-making bot for one trading pair.
//!
//! Wires the quoting pipeline to an exchange gateway and the operator
//! console, runs the single event loop and shuts down with a bounded
//! cancel-all.

pub mod app;
pub mod config;
pub mod error;

pub use app::{Application, RunSummary};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
