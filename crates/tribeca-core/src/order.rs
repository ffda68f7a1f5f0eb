//! Order lifecycle types.
//!
//! `Order` is owned by the order broker; everything else in the system
//! refers to an order only through its `OrderId`.

use crate::{CurrencyPair, Price, Size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Quote/order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Bid => Self::Ask,
            Self::Ask => Self::Bid,
        }
    }

    /// Returns 1 for bid, -1 for ask (for base inventory deltas).
    pub fn sign(&self) -> i8 {
        match self {
            Self::Bid => 1,
            Self::Ask => -1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bid => write!(f, "bid"),
            Self::Ask => write!(f, "ask"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderType {
    #[default]
    Limit,
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limit => write!(f, "Limit"),
            Self::Market => write!(f, "Market"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    #[default]
    #[serde(rename = "GTC")]
    GoodTilCancelled,
    #[serde(rename = "IOC")]
    ImmediateOrCancel,
    #[serde(rename = "FOK")]
    FillOrKill,
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GoodTilCancelled => write!(f, "GTC"),
            Self::ImmediateOrCancel => write!(f, "IOC"),
            Self::FillOrKill => write!(f, "FOK"),
        }
    }
}

/// Locally generated order identifier.
///
/// Assigned at submission so that acknowledgements can be correlated
/// before the exchange has assigned its own id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Format: `{timestamp_ms}-{uuid_short}`
    pub fn generate() -> Self {
        let ts = Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().simple().to_string()[..8];
        Self(format!("{ts}-{uuid_short}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Order state machine.
///
/// ```text
/// New -> Working -> {PartiallyFilled -> Working | Complete | Cancelled | Rejected}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    Working,
    PartiallyFilled,
    Complete,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Complete, Cancelled and Rejected orders leave the live set.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled | Self::Rejected)
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether an acknowledgement moving `self` to `next` is legal.
    ///
    /// An exchange may fill or reject an order in its very first
    /// acknowledgement, so `New` may jump straight to any later state.
    #[must_use]
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match self {
            Self::New => next != Self::New,
            Self::Working | Self::PartiallyFilled => next != Self::New,
            Self::Complete | Self::Cancelled | Self::Rejected => false,
        }
    }

    /// Stable numeric code used by the compressed wire encoding.
    pub fn code(&self) -> u8 {
        match self {
            Self::New => 0,
            Self::Working => 1,
            Self::Complete => 2,
            Self::Cancelled => 3,
            Self::Rejected => 4,
            Self::PartiallyFilled => 5,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "New",
            Self::Working => "Working",
            Self::PartiallyFilled => "PartiallyFilled",
            Self::Complete => "Complete",
            Self::Cancelled => "Cancelled",
            Self::Rejected => "Rejected",
        };
        write!(f, "{s}")
    }
}

/// Request to place an order, from the quoter or an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub side: Side,
    pub price: Price,
    pub quantity: Size,
    #[serde(default)]
    pub order_type: OrderType,
    #[serde(default)]
    pub time_in_force: TimeInForce,
}

impl NewOrderRequest {
    pub fn limit(side: Side, price: Price, quantity: Size) -> Self {
        Self {
            side,
            price,
            quantity,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::GoodTilCancelled,
        }
    }
}

/// Acknowledgement or fill reported by the order-entry feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub time: DateTime<Utc>,
    pub exchange_id: Option<String>,
    /// New resting price after an amendment.
    pub price: Option<Price>,
    /// New total quantity after an amendment.
    pub quantity: Option<Size>,
    pub leaves_quantity: Option<Size>,
    /// Fill price of this update, if it carries a fill.
    pub last_price: Option<Price>,
    /// Fill quantity of this update, if it carries a fill.
    pub last_quantity: Option<Size>,
    pub reject_reason: Option<String>,
}

impl OrderUpdate {
    /// Bare status change with no fill or amendment.
    pub fn status(order_id: OrderId, status: OrderStatus, time: DateTime<Utc>) -> Self {
        Self {
            order_id,
            status,
            time,
            exchange_id: None,
            price: None,
            quantity: None,
            leaves_quantity: None,
            last_price: None,
            last_quantity: None,
            reject_reason: None,
        }
    }

    /// Status change that carries a fill.
    pub fn fill(
        order_id: OrderId,
        status: OrderStatus,
        time: DateTime<Utc>,
        price: Price,
        quantity: Size,
        leaves: Size,
    ) -> Self {
        Self {
            last_price: Some(price),
            last_quantity: Some(quantity),
            leaves_quantity: Some(leaves),
            ..Self::status(order_id, status, time)
        }
    }
}

/// Authoritative order record kept by the order broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub exchange_id: Option<String>,
    pub exchange: String,
    pub pair: CurrencyPair,
    pub side: Side,
    pub price: Price,
    pub quantity: Size,
    pub leaves_quantity: Size,
    pub filled_quantity: Size,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Submission-to-first-acknowledgement latency in milliseconds.
    pub latency_ms: Option<i64>,
    pub pending_cancel: bool,
    pub pending_replace: bool,
    pub reject_reason: Option<String>,
}

impl Order {
    /// True while a cancel or replace has been sent but not yet acknowledged.
    pub fn has_outstanding_command(&self) -> bool {
        self.status == OrderStatus::New || self.pending_cancel || self.pending_replace
    }
}

/// Published view of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub order_id: OrderId,
    pub exchange_id: Option<String>,
    pub exchange: String,
    pub pair: CurrencyPair,
    pub side: Side,
    pub price: Price,
    pub quantity: Size,
    pub leaves_quantity: Size,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub time: DateTime<Utc>,
    pub latency_ms: Option<i64>,
    pub reject_reason: Option<String>,
}

impl From<&Order> for OrderStatusReport {
    fn from(o: &Order) -> Self {
        Self {
            order_id: o.order_id.clone(),
            exchange_id: o.exchange_id.clone(),
            exchange: o.exchange.clone(),
            pair: o.pair.clone(),
            side: o.side,
            price: o.price,
            quantity: o.quantity,
            leaves_quantity: o.leaves_quantity,
            order_type: o.order_type,
            time_in_force: o.time_in_force,
            status: o.status,
            time: o.updated_at,
            latency_ms: o.latency_ms,
            reject_reason: o.reject_reason.clone(),
        }
    }
}

/// Fill record. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub order_id: OrderId,
    pub time: DateTime<Utc>,
    pub pair: CurrencyPair,
    pub side: Side,
    pub price: Price,
    pub quantity: Size,
}

impl Trade {
    pub fn value(&self) -> rust_decimal::Decimal {
        self.quantity.notional(self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Bid.opposite(), Side::Ask);
        assert_eq!(Side::Ask.opposite(), Side::Bid);
        assert_eq!(Side::Bid.sign(), 1);
    }

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Complete.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::PartiallyFilled.is_live());
        assert!(OrderStatus::New.is_live());
    }

    #[test]
    fn test_transitions() {
        assert!(OrderStatus::New.can_transition_to(OrderStatus::Working));
        assert!(OrderStatus::New.can_transition_to(OrderStatus::Rejected));
        assert!(OrderStatus::Working.can_transition_to(OrderStatus::PartiallyFilled));
        assert!(OrderStatus::PartiallyFilled.can_transition_to(OrderStatus::Working));
        assert!(!OrderStatus::Working.can_transition_to(OrderStatus::New));
        assert!(!OrderStatus::Complete.can_transition_to(OrderStatus::Working));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_order_id_unique() {
        assert_ne!(OrderId::generate(), OrderId::generate());
    }

    #[test]
    fn test_status_serde_roundtrip_name() {
        let json = serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap();
        assert_eq!(json, "\"PartiallyFilled\"");
    }
}
