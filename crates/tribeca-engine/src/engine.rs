//! The quoting pipeline for one trading pair.
//!
//! Every inbound event (gateway feed or operator command) goes through
//! `Engine::handle`, one at a time. Each reaction is a short synchronous
//! recomputation:
//!
//! ```text
//! market data -> filtration -> fair value -> position valuation
//!             -> statistics -> target position -> safety -> quote -> risk gate -> quoter
//! ```
//!
//! Order acknowledgements, balances, connectivity and parameter changes
//! enter the same chain at the step they affect. Public trades are only
//! recorded; they never move the quote.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tribeca_broker::{
    CombinedGateway, GatewayDetails, GatewayEvent, MarketDataBroker, MarketTradeBroker,
    OrderBroker, PositionBroker,
};
use tribeca_bus::{BatchPolicy, BusResult, MessageBus, Observable, Topic};
use tribeca_core::{
    ConnectivityStatus, MarketTrade, MarketUpdate, NewOrderRequest, OrderId, PongAt,
    PositionReport, Price,
    ProductAdvertisement, QuotingParameters, Side, Trade, TradeSafety, TwoSidedQuote,
    TwoSidedQuoteStatus,
};
use tribeca_persistence::{Persister, Repository};
use tribeca_telemetry::Metrics;

use crate::active::ActiveRepository;
use crate::error::EngineResult;
use crate::fair_value::FairValueEngine;
use crate::filtration::MarketFiltration;
use crate::params_repository::QuotingParametersRepository;
use crate::position_management::{PositionManager, TargetBasePositionManager};
use crate::quote_sender::{GateContext, QuoteSender};
use crate::quoting_engine::{QuoteInputs, QuotingEngine};
use crate::safety::SafetyCalculator;
use crate::statistics::TrendStatistics;

/// Trades loaded from the persister at start.
pub const TRADE_HISTORY_LIMIT: usize = 10_000;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bound on the shutdown cancel-all handshake.
    #[serde(default = "default_cancel_all_timeout_ms")]
    pub cancel_all_timeout_ms: u64,

    /// Free balance kept aside when placing quotes.
    #[serde(default)]
    pub min_balance_margin: Decimal,

    /// Smallest target-position move worth publishing in the EWMA modes.
    #[serde(default = "default_target_position_threshold")]
    pub target_position_threshold: Decimal,

    /// Smallest trend move that triggers a target recompute.
    #[serde(default = "default_trend_threshold")]
    pub trend_threshold: Decimal,
}

fn default_cancel_all_timeout_ms() -> u64 {
    1000
}

fn default_target_position_threshold() -> Decimal {
    dec!(0.05)
}

fn default_trend_threshold() -> Decimal {
    dec!(0.01)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cancel_all_timeout_ms: default_cancel_all_timeout_ms(),
            min_balance_margin: Decimal::ZERO,
            target_position_threshold: default_target_position_threshold(),
            trend_threshold: default_trend_threshold(),
        }
    }
}

impl EngineConfig {
    pub fn cancel_all_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_all_timeout_ms)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Command arriving from the operator channel.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    ParametersChange(QuotingParameters),
    ActiveChange(bool),
    SubmitOrder(NewOrderRequest),
    CancelOrder(OrderId),
    CancelAll,
    CleanAllClosed,
    CleanAll,
    Notepad(String),
    ToggleConfigs(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Gateway(GatewayEvent),
    Command(OperatorCommand),
}

#[derive(Debug, Clone, Deserialize)]
struct CancelOrderRequest {
    order_id: OrderId,
}

fn forward<T, F>(
    bus: &MessageBus,
    topic: Topic,
    events: &mpsc::UnboundedSender<EngineEvent>,
    wrap: F,
) -> BusResult<()>
where
    T: DeserializeOwned + 'static,
    F: Fn(T) -> OperatorCommand + Send + Sync + 'static,
{
    let events = events.clone();
    bus.register_receiver(topic, move |msg: T| {
        if events.send(EngineEvent::Command(wrap(msg))).is_err() {
            debug!(topic = %topic, "Engine stopped, dropping operator command");
        }
    })
}

/// Route every operator command topic into the engine's event queue.
pub fn register_operator_commands(
    bus: &MessageBus,
    events: &mpsc::UnboundedSender<EngineEvent>,
) -> BusResult<()> {
    forward(bus, Topic::QuotingParametersChange, events, OperatorCommand::ParametersChange)?;
    forward(bus, Topic::ActiveChange, events, OperatorCommand::ActiveChange)?;
    forward(bus, Topic::SubmitNewOrder, events, OperatorCommand::SubmitOrder)?;
    forward(bus, Topic::CancelOrder, events, |req: CancelOrderRequest| {
        OperatorCommand::CancelOrder(req.order_id)
    })?;
    forward(bus, Topic::CancelAllOrders, events, |_: IgnoredAny| {
        OperatorCommand::CancelAll
    })?;
    forward(bus, Topic::CleanAllClosedOrders, events, |_: IgnoredAny| {
        OperatorCommand::CleanAllClosed
    })?;
    forward(bus, Topic::CleanAllOrders, events, |_: IgnoredAny| {
        OperatorCommand::CleanAll
    })?;
    forward(bus, Topic::Notepad, events, OperatorCommand::Notepad)?;
    forward(bus, Topic::ToggleConfigs, events, OperatorCommand::ToggleConfigs)?;
    Ok(())
}

/// Result of the shutdown cancel-all handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every live order was acknowledged as closed.
    Completed { cancelled: usize },
    /// The timeout elapsed with orders still live.
    TimedOut { remaining: usize },
}

/// Stores the engine reads at start and writes as it runs.
pub struct EngineStores {
    pub parameters: Arc<dyn Repository<QuotingParameters>>,
    pub active: Arc<dyn Repository<bool>>,
    pub trades: Arc<dyn Persister<Trade>>,
    pub market_trades: Arc<dyn Persister<MarketTrade>>,
}

// ============================================================================
// Engine
// ============================================================================

pub struct Engine {
    config: EngineConfig,
    details: GatewayDetails,
    parameters: QuotingParametersRepository,
    active: ActiveRepository,
    broker: OrderBroker,
    positions: PositionBroker,
    market_data: MarketDataBroker,
    market_trades: MarketTradeBroker,
    batch: BatchPolicy,
    filtration: MarketFiltration,
    fair_value: FairValueEngine,
    statistics: TrendStatistics,
    position_manager: PositionManager,
    target: TargetBasePositionManager,
    safety: SafetyCalculator,
    quoting: QuotingEngine,
    sender: QuoteSender,
    connectivity: Observable<ConnectivityStatus>,
    notepad: Observable<String>,
    show_configs: Observable<bool>,
    events_processed: u64,
    shutting_down: bool,
}

impl Engine {
    /// Build the pipeline in dependency order and register its snapshots
    /// on `bus`.
    pub fn new(
        bus: &MessageBus,
        config: EngineConfig,
        gateway: Arc<dyn CombinedGateway>,
        stores: EngineStores,
        defaults: QuotingParameters,
        start_active: bool,
        environment: impl Into<String>,
    ) -> EngineResult<Self> {
        let details = gateway.details().clone();
        let parameters = QuotingParametersRepository::new(bus, stores.parameters, defaults)?;
        let params = parameters.latest();
        let active = ActiveRepository::new(bus, stores.active, start_active)?;
        let batch = bus.batch_policy(params.ui_delay());

        let history = match stores.trades.load_all(TRADE_HISTORY_LIMIT) {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "Failed to load trade history, starting empty");
                Vec::new()
            }
        };
        info!(trades = history.len(), "Loaded trade history");
        let mut broker = OrderBroker::new(gateway, bus, stores.trades, history)?;
        if params.mode.is_ping_pong() {
            broker.replay_matching(params.pong_at);
        }

        let advertisement = ProductAdvertisement {
            exchange: details.name.clone(),
            pair: details.pair.clone(),
            environment: environment.into(),
            min_tick: details.min_tick,
            mode: params.mode,
        };
        bus.publisher::<ProductAdvertisement>(Topic::ProductAdvertisement)
            .register_snapshot(move || vec![advertisement.clone()])?;

        Ok(Self {
            positions: PositionBroker::new(details.pair.clone(), bus)?,
            market_data: MarketDataBroker::new(bus, &batch)?,
            market_trades: MarketTradeBroker::new(
                details.name.clone(),
                details.pair.clone(),
                bus,
                &batch,
                stores.market_trades,
            )?,
            filtration: MarketFiltration::new(),
            fair_value: FairValueEngine::new(bus, details.min_tick)?,
            statistics: TrendStatistics::new(&params),
            position_manager: PositionManager::new(config.trend_threshold),
            target: TargetBasePositionManager::new(bus, config.target_position_threshold)?,
            safety: SafetyCalculator::new(bus)?,
            quoting: QuotingEngine::new(),
            sender: QuoteSender::new(bus, config.min_balance_margin)?,
            connectivity: Observable::published_with(
                bus.publisher(Topic::ExchangeConnectivity),
                ConnectivityStatus::Disconnected,
            )?,
            notepad: Observable::published_with(bus.publisher(Topic::Notepad), String::new())?,
            show_configs: Observable::published_with(bus.publisher(Topic::ToggleConfigs), true)?,
            batch,
            config,
            details,
            parameters,
            active,
            broker,
            events_processed: 0,
            shutting_down: false,
        })
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn details(&self) -> &GatewayDetails {
        &self.details
    }

    pub fn parameters(&self) -> QuotingParameters {
        self.parameters.latest()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_active()
    }

    pub fn quote(&self) -> Option<TwoSidedQuote> {
        self.quoting.latest()
    }

    pub fn quote_status(&self) -> TwoSidedQuoteStatus {
        self.sender.status()
    }

    pub fn fair_value(&self) -> Option<Price> {
        self.fair_value.latest_price()
    }

    pub fn position(&self) -> Option<PositionReport> {
        self.positions.latest_report()
    }

    pub fn target_base_position(&self) -> Option<Decimal> {
        self.target.latest()
    }

    pub fn safety(&self) -> Option<TradeSafety> {
        self.safety.latest()
    }

    pub fn broker(&self) -> &OrderBroker {
        &self.broker
    }

    pub fn market_trades(&self) -> Vec<MarketTrade> {
        self.market_trades.recent()
    }

    /// Batching policy of the busy operator topics. The caller runs its
    /// flush loop.
    pub fn batch_policy(&self) -> BatchPolicy {
        self.batch.clone()
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    // ------------------------------------------------------------------------
    // Event handling
    // ------------------------------------------------------------------------

    pub fn handle(&mut self, event: EngineEvent, now: DateTime<Utc>) {
        self.events_processed += 1;
        match event {
            EngineEvent::Gateway(event) => self.on_gateway(event, now),
            EngineEvent::Command(command) => self.on_command(command, now),
        }
    }

    fn on_gateway(&mut self, event: GatewayEvent, now: DateTime<Utc>) {
        match event {
            GatewayEvent::MarketData(update) => {
                self.market_data.on_market_data(update.clone());
                self.on_book(&update, now);
            }
            GatewayEvent::MarketTrade(print) => {
                let book = self.market_data.latest();
                self.market_trades
                    .on_trade(print, self.quoting.latest(), book.as_ref());
                return;
            }
            GatewayEvent::Order(update) => {
                let pong_at = self.pong_at();
                let outcome = self.broker.on_order_update(update, pong_at);
                if outcome.is_some_and(|o| o.trade.is_some()) {
                    self.recompute_safety(now);
                }
            }
            GatewayEvent::Position(position) => {
                let fair_value = self.fair_value.latest_price();
                if self.positions.on_position(position, fair_value, now) {
                    self.recompute_target(now);
                }
            }
            GatewayEvent::Connectivity(status) => {
                if self.connectivity.set(status) {
                    info!(status = ?status, "Exchange connectivity changed");
                    Metrics::exchange_connected(status.is_connected());
                }
                self.active.on_connectivity(status);
            }
        }
        self.requote(now);
    }

    fn on_book(&mut self, raw: &MarketUpdate, now: DateTime<Utc>) {
        let own = self.broker.live_orders();
        let filtered = self.filtration.on_market_data(raw, &own).cloned();
        let params = self.parameters.latest();
        if !self.fair_value.recompute(filtered.as_ref(), params.fv_model) {
            return;
        }
        let fair_value = self.fair_value.latest_price();
        self.positions.revalue(fair_value, now);
        if let Some(fv) = fair_value {
            let ewma = self.statistics.on_fair_value(fv, now);
            self.position_manager
                .update(params.auto_position_mode, &ewma, Some(fv));
        }
        self.recompute_target(now);
        self.recompute_safety(now);
    }

    fn on_command(&mut self, command: OperatorCommand, now: DateTime<Utc>) {
        match command {
            OperatorCommand::ParametersChange(next) => match self.parameters.update(next) {
                Ok(true) => {
                    let params = self.parameters.latest();
                    self.statistics.reconfigure(&params);
                    self.batch.set_delay(params.ui_delay());
                    if params.mode.is_ping_pong() {
                        self.broker.replay_matching(params.pong_at);
                    }
                    self.recompute_target(now);
                    self.recompute_safety(now);
                }
                Ok(false) => debug!("Quoting parameters unchanged"),
                Err(e) => warn!(error = %e, "Rejected quoting parameters"),
            },
            OperatorCommand::ActiveChange(saved) => {
                self.active.set_saved(saved);
            }
            OperatorCommand::SubmitOrder(request) => {
                match self.broker.submit(request, now) {
                    Ok(order_id) => info!(order_id = %order_id, "Manual order submitted"),
                    Err(e) => warn!(error = %e, "Manual order failed"),
                }
            }
            OperatorCommand::CancelOrder(order_id) => {
                if let Err(e) = self.broker.cancel(&order_id, now) {
                    warn!(order_id = %order_id, error = %e, "Manual cancel failed");
                }
            }
            OperatorCommand::CancelAll => {
                self.broker.cancel_all(now);
            }
            OperatorCommand::CleanAllClosed => {
                self.broker.clean_closed();
            }
            OperatorCommand::CleanAll => {
                let pings_only = self.parameters.latest().mode.is_ping_pong();
                self.broker.clean_all(pings_only);
                self.recompute_safety(now);
            }
            OperatorCommand::Notepad(text) => {
                self.notepad.set(text);
            }
            OperatorCommand::ToggleConfigs(show) => {
                self.show_configs.set(show);
            }
        }
        self.requote(now);
    }

    fn pong_at(&self) -> Option<PongAt> {
        let params = self.parameters.latest();
        params.mode.is_ping_pong().then_some(params.pong_at)
    }

    fn recompute_target(&mut self, now: DateTime<Utc>) {
        let params = self.parameters.latest();
        let report = self.positions.latest_report();
        self.target
            .recompute(self.position_manager.trend(), &params, report.as_ref(), now);
    }

    fn recompute_safety(&mut self, now: DateTime<Utc>) {
        let params = self.parameters.latest();
        let trades = self.broker.trades();
        let buy_pings = self.broker.open_pings(Side::Bid);
        let sell_pings = self.broker.open_pings(Side::Ask);
        self.safety
            .recompute(&trades, &buy_pings, &sell_pings, &params, now);
    }

    fn requote(&mut self, now: DateTime<Utc>) {
        if self.shutting_down {
            return;
        }
        let params = self.parameters.latest();
        let ewma = self.statistics.snapshot();
        let position = self.positions.latest_report();
        let safety = self.safety.latest();
        let active = self.active.is_active();
        let inputs = QuoteInputs {
            book: self.filtration.latest(),
            fair_value: self.fair_value.latest_price(),
            params: &params,
            ewma: &ewma,
            target_base_position: self.target.latest(),
            position: position.as_ref(),
            safety: safety.as_ref(),
            tick: self.details.min_tick,
            min_size: self.details.min_size,
            active,
        };
        self.quoting.recompute(&inputs);
        let quote = self.quoting.latest();
        let ctx = GateContext {
            params: &params,
            position: position.as_ref(),
            active,
        };
        self.sender.send(quote.as_ref(), &ctx, &mut self.broker, now);
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    /// Stop quoting, cancel every live order and wait for the exchange to
    /// confirm, for at most `timeout`.
    ///
    /// Only order acknowledgements are consumed from `events` while waiting.
    pub async fn cancel_all_orders(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<EngineEvent>,
        timeout: Duration,
    ) -> ShutdownOutcome {
        self.shutting_down = true;
        let requested = self.broker.cancel_all(Utc::now());
        let live_before = self.broker.live_count();
        info!(requested, live = live_before, "Cancelling all open orders");

        let _ = tokio::time::timeout(timeout, self.drain_order_updates(events)).await;

        let remaining = self.broker.live_count();
        if remaining == 0 {
            info!(cancelled = live_before, "All open orders cancelled");
            ShutdownOutcome::Completed {
                cancelled: live_before,
            }
        } else {
            warn!(remaining, "Could not cancel all open orders!");
            ShutdownOutcome::TimedOut { remaining }
        }
    }

    async fn drain_order_updates(&mut self, events: &mut mpsc::UnboundedReceiver<EngineEvent>) {
        let pong_at = self.pong_at();
        while self.broker.live_count() > 0 {
            match events.recv().await {
                Some(EngineEvent::Gateway(GatewayEvent::Order(update))) => {
                    self.broker.on_order_update(update, pong_at);
                }
                Some(_) => {}
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tribeca_broker::{GatewayCommand, RecordingGateway};
    use tribeca_core::{
        AutoPositionMode, CurrencyPair, CurrencyPosition, MarketLevel, OrderStatus, OrderUpdate,
        QuoteStatus, QuotingMode, Size,
    };
    use tribeca_persistence::MemoryStore;

    fn details() -> GatewayDetails {
        GatewayDetails {
            name: "Test".into(),
            pair: CurrencyPair::new("BTC", "USD"),
            min_tick: Price::new(dec!(0.01)),
            min_size: Size::new(dec!(0.01)),
            has_self_trade_prevention: false,
            supports_replace: true,
        }
    }

    fn mid_params() -> QuotingParameters {
        QuotingParameters {
            mode: QuotingMode::Mid,
            width: Price::new(dec!(2)),
            auto_position_mode: AutoPositionMode::Manual,
            target_base_position: dec!(10),
            ..Default::default()
        }
    }

    fn stores() -> EngineStores {
        EngineStores {
            parameters: Arc::new(MemoryStore::<QuotingParameters>::new()),
            active: Arc::new(MemoryStore::<bool>::new()),
            trades: Arc::new(MemoryStore::<Trade>::new()),
            market_trades: Arc::new(MemoryStore::<MarketTrade>::new()),
        }
    }

    fn engine(bus: &MessageBus) -> (Arc<RecordingGateway>, Engine) {
        let gateway = Arc::new(RecordingGateway::new(details()));
        let engine = Engine::new(
            bus,
            EngineConfig::default(),
            gateway.clone(),
            stores(),
            mid_params(),
            true,
            "test",
        )
        .unwrap();
        (gateway, engine)
    }

    fn book() -> MarketUpdate {
        let lvl = |px, sz| MarketLevel::new(Price::new(px), Size::new(sz));
        MarketUpdate::new(
            Utc::now(),
            vec![lvl(dec!(99), dec!(1)), lvl(dec!(98), dec!(2))],
            vec![lvl(dec!(101), dec!(1)), lvl(dec!(102), dec!(2))],
        )
    }

    fn gw(event: GatewayEvent) -> EngineEvent {
        EngineEvent::Gateway(event)
    }

    /// Connected, funded and fed one book.
    fn quoting_engine(bus: &MessageBus, usd: Decimal) -> (Arc<RecordingGateway>, Engine) {
        let (gateway, mut engine) = engine(bus);
        let now = Utc::now();
        engine.handle(gw(GatewayEvent::Connectivity(ConnectivityStatus::Connected)), now);
        engine.handle(
            gw(GatewayEvent::Position(CurrencyPosition::new("BTC", dec!(10), Decimal::ZERO))),
            now,
        );
        engine.handle(
            gw(GatewayEvent::Position(CurrencyPosition::new("USD", usd, Decimal::ZERO))),
            now,
        );
        engine.handle(gw(GatewayEvent::MarketData(book())), now);
        (gateway, engine)
    }

    fn sent_ids(gateway: &RecordingGateway) -> Vec<OrderId> {
        gateway
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCommand::Send { order_id, .. } => Some(order_id),
                _ => None,
            })
            .collect()
    }

    fn ack_all(engine: &mut Engine, ids: &[OrderId], status: OrderStatus) {
        for id in ids {
            engine.handle(
                gw(GatewayEvent::Order(OrderUpdate::status(id.clone(), status, Utc::now()))),
                Utc::now(),
            );
        }
    }

    #[test]
    fn test_mid_scenario_quotes_both_sides() {
        let (gateway, engine) = quoting_engine(&MessageBus::null(), dec!(10000));
        assert!(engine.is_active());
        assert_eq!(engine.fair_value(), Some(Price::new(dec!(100))));
        let quote = engine.quote().unwrap();
        assert_eq!(quote.bid.unwrap().price, Price::new(dec!(99)));
        assert_eq!(quote.ask.unwrap().price, Price::new(dec!(101)));
        assert_eq!(
            engine.quote_status(),
            TwoSidedQuoteStatus::new(QuoteStatus::Live, QuoteStatus::Live)
        );
        assert_eq!(sent_ids(&gateway).len(), 2);
    }

    #[test]
    fn test_no_quote_before_fair_value() {
        let (gateway, mut engine) = engine(&MessageBus::null());
        engine.handle(
            gw(GatewayEvent::Connectivity(ConnectivityStatus::Connected)),
            Utc::now(),
        );
        assert!(engine.quote().is_none());
        assert!(gateway.commands().is_empty());
    }

    #[test]
    fn test_insufficient_balance_holds_bid() {
        let (gateway, engine) = quoting_engine(&MessageBus::null(), dec!(1));
        assert!(engine.quote().unwrap().bid.is_some());
        assert_eq!(engine.quote_status().bid_status, QuoteStatus::Held);
        assert_eq!(engine.quote_status().ask_status, QuoteStatus::Live);
        assert_eq!(sent_ids(&gateway).len(), 1);
    }

    #[test]
    fn test_deactivating_pulls_quotes() {
        let (gateway, mut engine) = quoting_engine(&MessageBus::null(), dec!(10000));
        let ids = sent_ids(&gateway);
        ack_all(&mut engine, &ids, OrderStatus::Working);
        gateway.clear();

        engine.handle(
            EngineEvent::Command(OperatorCommand::ActiveChange(false)),
            Utc::now(),
        );
        assert!(!engine.is_active());
        assert!(engine.quote().is_none());
        let cancels = gateway
            .commands()
            .iter()
            .filter(|c| matches!(c, GatewayCommand::Cancel { .. }))
            .count();
        assert_eq!(cancels, 2);
    }

    #[test]
    fn test_parameter_change_moves_quote() {
        let (gateway, mut engine) = quoting_engine(&MessageBus::null(), dec!(10000));
        let ids = sent_ids(&gateway);
        ack_all(&mut engine, &ids, OrderStatus::Working);
        gateway.clear();

        let wider = QuotingParameters {
            width: Price::new(dec!(4)),
            ..mid_params()
        };
        engine.handle(
            EngineEvent::Command(OperatorCommand::ParametersChange(wider)),
            Utc::now(),
        );
        assert_eq!(engine.parameters().version, 1);
        assert_eq!(engine.quote().unwrap().bid.unwrap().price, Price::new(dec!(98)));
        let replaces = gateway
            .commands()
            .iter()
            .filter(|c| matches!(c, GatewayCommand::Replace { .. }))
            .count();
        assert_eq!(replaces, 2);
    }

    #[test]
    fn test_fill_is_recorded_once() {
        let (gateway, mut engine) = quoting_engine(&MessageBus::null(), dec!(10000));
        let ids = sent_ids(&gateway);
        ack_all(&mut engine, &ids, OrderStatus::Working);
        let now = Utc::now();
        engine.handle(
            gw(GatewayEvent::Order(OrderUpdate::fill(
                ids[0].clone(),
                OrderStatus::Complete,
                now,
                Price::new(dec!(99)),
                Size::new(dec!(0.02)),
                Size::ZERO,
            ))),
            now,
        );
        assert_eq!(engine.broker().trades().len(), 1);
        assert!(engine.safety().is_some());
    }

    #[tokio::test]
    async fn test_identical_books_publish_fair_value_once() {
        let bus = MessageBus::new();
        let (_gateway, mut engine) = engine(&bus);
        let mut sub = bus.subscribe(Topic::FairValue);
        let update = book();
        engine.handle(gw(GatewayEvent::MarketData(update.clone())), Utc::now());
        engine.handle(gw(GatewayEvent::MarketData(update)), Utc::now());
        assert!(sub.messages.try_recv().is_ok());
        assert!(sub.messages.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_operator_commands_are_queued() {
        let bus = MessageBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        register_operator_commands(&bus, &tx).unwrap();

        bus.deliver(Topic::ActiveChange, serde_json::json!(false)).unwrap();
        bus.deliver(Topic::CancelAllOrders, serde_json::Value::Null).unwrap();
        bus.deliver(Topic::CancelOrder, serde_json::json!({ "order_id": "abc" }))
            .unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::Command(OperatorCommand::ActiveChange(false))
        );
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::Command(OperatorCommand::CancelAll));
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::Command(OperatorCommand::CancelOrder(OrderId::from("abc")))
        );
        // A second registration is a defect.
        assert!(register_operator_commands(&bus, &tx).is_err());
    }

    #[tokio::test]
    async fn test_notepad_is_echoed() {
        let bus = MessageBus::new();
        let (_gateway, mut engine) = engine(&bus);
        let mut sub = bus.subscribe(Topic::Notepad);
        assert_eq!(sub.snapshot, vec![serde_json::json!("")]);
        engine.handle(
            EngineEvent::Command(OperatorCommand::Notepad("hello".into())),
            Utc::now(),
        );
        assert_eq!(sub.messages.try_recv().unwrap(), serde_json::json!("hello"));
    }

    #[tokio::test]
    async fn test_toggle_configs_is_echoed() {
        let bus = MessageBus::new();
        let (_gateway, mut engine) = engine(&bus);
        let mut sub = bus.subscribe(Topic::ToggleConfigs);
        assert_eq!(sub.snapshot, vec![serde_json::json!(true)]);

        let (tx, mut rx) = mpsc::unbounded_channel();
        register_operator_commands(&bus, &tx).unwrap();
        bus.deliver(Topic::ToggleConfigs, serde_json::json!(false)).unwrap();
        let command = rx.try_recv().unwrap();
        assert_eq!(command, EngineEvent::Command(OperatorCommand::ToggleConfigs(false)));

        engine.handle(command, Utc::now());
        assert_eq!(sub.messages.try_recv().unwrap(), serde_json::json!(false));
    }

    #[tokio::test]
    async fn test_market_trade_recorded_with_quote_and_book() {
        let bus = MessageBus::new();
        let (gateway, mut engine) = quoting_engine(&bus, dec!(10000));
        let mut sub = bus.subscribe(Topic::MarketTrade);
        gateway.clear();

        let print = tribeca_core::GatewayMarketTrade {
            time: Utc::now(),
            price: Price::new(dec!(101)),
            size: Size::new(dec!(0.5)),
            make_side: Side::Ask,
        };
        engine.handle(gw(GatewayEvent::MarketTrade(print)), Utc::now());

        let trades = engine.market_trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quote, engine.quote());
        assert_eq!(trades[0].bid.map(|l| l.price), Some(Price::new(dec!(99))));
        assert_eq!(trades[0].ask.map(|l| l.price), Some(Price::new(dec!(101))));
        assert!(sub.messages.try_recv().is_ok());
        // A tape print never moves our orders.
        assert!(gateway.commands().is_empty());
    }

    #[tokio::test]
    async fn test_delay_ui_batches_market_data() {
        let bus = MessageBus::new();
        let (_gateway, mut engine) = engine(&bus);
        assert!(engine.batch_policy().delay().is_none());

        let params = QuotingParameters {
            delay_ui: 1,
            ..mid_params()
        };
        engine.handle(
            EngineEvent::Command(OperatorCommand::ParametersChange(params)),
            Utc::now(),
        );
        assert_eq!(engine.batch_policy().delay(), Some(Duration::from_secs(1)));

        let mut sub = bus.subscribe(Topic::MarketData);
        engine.handle(gw(GatewayEvent::MarketData(book())), Utc::now());
        assert!(sub.messages.try_recv().is_err());
        assert_eq!(engine.batch_policy().flush(), 1);
        assert!(sub.messages.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_cancel_all_completes_when_acknowledged() {
        let (gateway, mut engine) = quoting_engine(&MessageBus::null(), dec!(10000));
        let ids = sent_ids(&gateway);
        ack_all(&mut engine, &ids, OrderStatus::Working);

        let (tx, mut rx) = mpsc::unbounded_channel();
        for id in &ids {
            tx.send(gw(GatewayEvent::Order(OrderUpdate::status(
                id.clone(),
                OrderStatus::Cancelled,
                Utc::now(),
            ))))
            .unwrap();
        }
        let outcome = engine
            .cancel_all_orders(&mut rx, Duration::from_millis(500))
            .await;
        assert_eq!(outcome, ShutdownOutcome::Completed { cancelled: 2 });
    }

    #[tokio::test]
    async fn test_cancel_all_times_out_without_acknowledgement() {
        let (gateway, mut engine) = quoting_engine(&MessageBus::null(), dec!(10000));
        let ids = sent_ids(&gateway);
        ack_all(&mut engine, &ids, OrderStatus::Working);

        let (_tx, mut rx) = mpsc::unbounded_channel();
        let started = std::time::Instant::now();
        let outcome = engine
            .cancel_all_orders(&mut rx, Duration::from_millis(50))
            .await;
        assert_eq!(outcome, ShutdownOutcome::TimedOut { remaining: 2 });
        assert!(started.elapsed() < Duration::from_secs(1));

        // No requoting once shutdown started.
        gateway.clear();
        engine.handle(gw(GatewayEvent::MarketData(book())), Utc::now());
        assert!(gateway.commands().is_empty());
    }
}
