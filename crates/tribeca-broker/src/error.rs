//! Broker error types.

use thiserror::Error;
use tribeca_core::{OrderId, OrderStatus};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Gateway not connected")]
    NotConnected,

    #[error("Gateway rejected command: {0}")]
    Gateway(String),

    #[error("Unknown order: {0}")]
    UnknownOrder(OrderId),

    #[error("Order {order_id} is {status}, cannot {action}")]
    InvalidState {
        order_id: OrderId,
        status: OrderStatus,
        action: &'static str,
    },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Bus error: {0}")]
    Bus(#[from] tribeca_bus::BusError),
}

pub type BrokerResult<T> = Result<T, BrokerError>;
