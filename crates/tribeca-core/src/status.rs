//! Informational messages broadcast to operators.

use crate::{CurrencyPair, Price, QuotingMode};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Static description of what this process trades. Snapshot-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAdvertisement {
    pub exchange: String,
    pub pair: CurrencyPair,
    pub environment: String,
    pub min_tick: Price,
    pub mode: QuotingMode,
}

/// Heartbeat published on the event-loop probe interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationState {
    pub time: DateTime<Utc>,
    pub uptime_secs: u64,
    pub event_loop_delay_ms: u64,
    pub events_processed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectivityStatus {
    Connected,
    #[default]
    Disconnected,
}

impl ConnectivityStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Base inventory the quoting engine should steer toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetBasePosition {
    pub time: DateTime<Utc>,
    pub data: Decimal,
}

/// Rolling trade-frequency estimate.
///
/// `buy`, `sell` and `combined` are order-sized fills per minute inside the
/// configured window. `buy_ping`/`sell_pong` are the size-weighted prices of
/// the open buy and sell pings awaiting their pong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeSafety {
    pub buy: Decimal,
    pub sell: Decimal,
    pub combined: Decimal,
    pub buy_ping: Option<Price>,
    pub sell_pong: Option<Price>,
    pub time: DateTime<Utc>,
}

impl TradeSafety {
    /// Equality ignoring the timestamp.
    pub fn same_values(&self, other: &Self) -> bool {
        self.buy == other.buy
            && self.sell == other.sell
            && self.combined == other.combined
            && self.buy_ping == other.buy_ping
            && self.sell_pong == other.sell_pong
    }
}
