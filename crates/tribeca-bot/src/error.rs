//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine error: {0}")]
    Engine(#[from] tribeca_engine::EngineError),

    #[error("Broker error: {0}")]
    Broker(#[from] tribeca_broker::BrokerError),

    #[error("Bus error: {0}")]
    Bus(#[from] tribeca_bus::BusError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] tribeca_persistence::PersistenceError),

    #[error("Console error: {0}")]
    Console(#[from] tribeca_console::ConsoleError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tribeca_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
