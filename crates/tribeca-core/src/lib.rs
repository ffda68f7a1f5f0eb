//! Core domain types for the tribeca market maker.
//!
//! This crate provides the vocabulary shared by every other crate:
//! - `Price`, `Size`: precision-safe numeric types with tick rounding
//! - `MarketUpdate`, `FairValue`: order book snapshots and the reference price
//! - `MarketTrade`: public tape prints annotated with our quote
//! - `Order`, `OrderStatus`, `Trade`: the order lifecycle and fill ledger
//! - `QuotingParameters`: the versioned strategy configuration

pub mod decimal;
pub mod error;
pub mod market;
pub mod order;
pub mod params;
pub mod position;
pub mod quote;
pub mod status;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use market::{
    CurrencyPair, FairValue, GatewayMarketTrade, MarketLevel, MarketTrade, MarketUpdate,
};
pub use order::{
    NewOrderRequest, Order, OrderId, OrderStatus, OrderStatusReport, OrderType, OrderUpdate, Side,
    TimeInForce, Trade,
};
pub use params::{
    AutoPositionMode, AprMode, FairValueModel, PingAt, PongAt, QuotingMode, QuotingParameters,
};
pub use position::{CurrencyPosition, PositionReport};
pub use quote::{Quote, QuoteStatus, TwoSidedQuote, TwoSidedQuoteStatus};
pub use status::{
    ApplicationState, ConnectivityStatus, ProductAdvertisement, TargetBasePosition, TradeSafety,
};
