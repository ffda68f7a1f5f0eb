//! Exchange gateway capability.
//!
//! A gateway bundles three feeds of one exchange: market data, order entry
//! and balances. Commands are non-blocking; everything the exchange reports
//! back arrives later as a `GatewayEvent` on the channel handed to
//! `connect`, in the order the exchange produced it.

use crate::error::{BrokerError, BrokerResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tribeca_core::{
    ConnectivityStatus, CurrencyPair, CurrencyPosition, GatewayMarketTrade, MarketUpdate, Order,
    OrderId, OrderUpdate, Price, Size,
};

/// Static metadata of the connected exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayDetails {
    pub name: String,
    pub pair: CurrencyPair,
    pub min_tick: Price,
    pub min_size: Size,
    /// The exchange itself refuses to match our own orders.
    pub has_self_trade_prevention: bool,
    /// Orders can be amended in place instead of cancel + new.
    pub supports_replace: bool,
}

/// Everything a gateway reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    MarketData(MarketUpdate),
    MarketTrade(GatewayMarketTrade),
    Order(OrderUpdate),
    Position(CurrencyPosition),
    Connectivity(ConnectivityStatus),
}

pub trait CombinedGateway: Send + Sync {
    fn details(&self) -> &GatewayDetails;

    /// Start the feeds. Events flow into `events` until the gateway is
    /// disconnected or the receiver is dropped.
    fn connect(&self, events: mpsc::UnboundedSender<GatewayEvent>) -> BrokerResult<()>;

    /// Stop the feeds.
    fn disconnect(&self);

    fn send_order(&self, order: &Order) -> BrokerResult<()>;

    fn cancel_order(&self, order: &Order) -> BrokerResult<()>;

    fn replace_order(&self, order: &Order, price: Price, quantity: Size) -> BrokerResult<()>;
}

/// Command observed by `RecordingGateway`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCommand {
    Send {
        order_id: OrderId,
        price: Price,
        quantity: Size,
    },
    Cancel {
        order_id: OrderId,
    },
    Replace {
        order_id: OrderId,
        price: Price,
        quantity: Size,
    },
}

/// Gateway that records commands and never answers.
///
/// Acknowledgements are injected by the caller, which makes every
/// interleaving of commands and exchange responses reproducible in tests.
#[derive(Debug)]
pub struct RecordingGateway {
    details: GatewayDetails,
    commands: Mutex<Vec<GatewayCommand>>,
    fail_next: Mutex<Option<String>>,
}

impl RecordingGateway {
    pub fn new(details: GatewayDetails) -> Self {
        Self {
            details,
            commands: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
        }
    }

    pub fn commands(&self) -> Vec<GatewayCommand> {
        self.commands.lock().clone()
    }

    pub fn clear(&self) {
        self.commands.lock().clear();
    }

    /// Make the next command fail with `reason`.
    pub fn fail_next(&self, reason: impl Into<String>) {
        *self.fail_next.lock() = Some(reason.into());
    }

    fn record(&self, cmd: GatewayCommand) -> BrokerResult<()> {
        if let Some(reason) = self.fail_next.lock().take() {
            return Err(BrokerError::Gateway(reason));
        }
        self.commands.lock().push(cmd);
        Ok(())
    }
}

impl CombinedGateway for RecordingGateway {
    fn details(&self) -> &GatewayDetails {
        &self.details
    }

    fn connect(&self, _events: mpsc::UnboundedSender<GatewayEvent>) -> BrokerResult<()> {
        Ok(())
    }

    fn disconnect(&self) {}

    fn send_order(&self, order: &Order) -> BrokerResult<()> {
        self.record(GatewayCommand::Send {
            order_id: order.order_id.clone(),
            price: order.price,
            quantity: order.quantity,
        })
    }

    fn cancel_order(&self, order: &Order) -> BrokerResult<()> {
        self.record(GatewayCommand::Cancel {
            order_id: order.order_id.clone(),
        })
    }

    fn replace_order(&self, order: &Order, price: Price, quantity: Size) -> BrokerResult<()> {
        self.record(GatewayCommand::Replace {
            order_id: order.order_id.clone(),
            price,
            quantity,
        })
    }
}
