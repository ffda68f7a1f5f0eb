//! Exchange-facing side of the pipeline.
//!
//! - `CombinedGateway`: market-data, order-entry and position feeds of one exchange
//! - `NullGateway`: in-process exchange simulator
//! - `OrderBroker`: the only owner of order state and the trade ledger
//! - `PositionBroker`, `MarketDataBroker`: latest balances and book
//! - `MarketTradeBroker`: public trades from the exchange tape

pub mod error;
pub mod gateway;
pub mod market_data_broker;
pub mod market_trade_broker;
pub mod null_gateway;
pub mod order_broker;
pub mod position_broker;

pub use error::{BrokerError, BrokerResult};
pub use gateway::{
    CombinedGateway, GatewayCommand, GatewayDetails, GatewayEvent, RecordingGateway,
};
pub use market_data_broker::MarketDataBroker;
pub use market_trade_broker::{MarketTradeBroker, MARKET_TRADE_WINDOW};
pub use null_gateway::{NullGateway, NullGatewayConfig};
pub use order_broker::{OrderBroker, OrderUpdateOutcome};
pub use position_broker::PositionBroker;
