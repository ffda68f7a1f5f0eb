//! Engine error types.

use thiserror::Error;
use tribeca_broker::BrokerError;
use tribeca_bus::BusError;
use tribeca_core::CoreError;
use tribeca_persistence::PersistenceError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid quoting parameters: {0}")]
    Parameters(#[from] CoreError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

pub type EngineResult<T> = Result<T, EngineError>;
