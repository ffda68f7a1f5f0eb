//! Quoting pipeline.
//!
//! Components, in dependency order:
//! - `QuotingParametersRepository`, `ActiveRepository`: operator-controlled state
//! - `MarketFiltration`: book without our own orders
//! - `FairValueEngine`: reference price
//! - `TrendStatistics`: EWMAs of fair value
//! - `PositionManager`, `TargetBasePositionManager`: desired inventory
//! - `SafetyCalculator`: recent fill frequency
//! - `QuotingEngine`: desired two-sided quote
//! - `QuoteSender`: per-side risk gate
//! - `Quoter`: order placement through the order broker
//!
//! `Engine` wires them together and processes one event at a time.

pub mod active;
pub mod engine;
pub mod error;
pub mod fair_value;
pub mod filtration;
pub mod params_repository;
pub mod position_management;
pub mod quote_sender;
pub mod quoter;
pub mod quoting_engine;
pub mod quoting_styles;
pub mod safety;
pub mod statistics;

pub use active::ActiveRepository;
pub use engine::{
    register_operator_commands, Engine, EngineConfig, EngineEvent, EngineStores,
    OperatorCommand, ShutdownOutcome, TRADE_HISTORY_LIMIT,
};
pub use error::{EngineError, EngineResult};
pub use fair_value::{compute_fair_value, FairValueEngine};
pub use filtration::{filter_book, MarketFiltration};
pub use params_repository::QuotingParametersRepository;
pub use position_management::{PositionManager, TargetBasePositionManager};
pub use quote_sender::{GateContext, QuoteSender};
pub use quoter::{QuoteAction, Quoter};
pub use quoting_engine::{compute_quote, QuoteInputs, QuotingEngine};
pub use safety::{compute_safety, SafetyCalculator};
pub use statistics::{Ewma, EwmaSnapshot, TrendStatistics};
