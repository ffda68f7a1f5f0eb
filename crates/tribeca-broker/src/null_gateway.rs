//! In-process exchange simulator.
//!
//! Keeps a synthetic book that random-walks around a mid price, accepts
//! orders against simulated balances, fills orders that cross the
//! synthetic book and occasionally fills the resting order nearest to mid.
//! Everything is reported through the same events a real connector emits.

use crate::error::{BrokerError, BrokerResult};
use crate::gateway::{CombinedGateway, GatewayDetails, GatewayEvent};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tribeca_core::{
    ConnectivityStatus, CurrencyPair, CurrencyPosition, GatewayMarketTrade, MarketLevel,
    MarketUpdate, Order, OrderId, OrderStatus, OrderUpdate, Price, Side, Size,
};

/// Simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullGatewayConfig {
    #[serde(default = "default_min_tick")]
    pub min_tick: Price,

    #[serde(default = "default_min_size")]
    pub min_size: Size,

    #[serde(default = "default_start_price")]
    pub start_price: Price,

    #[serde(default = "default_base_balance")]
    pub base_balance: Decimal,

    #[serde(default = "default_quote_balance")]
    pub quote_balance: Decimal,

    #[serde(default = "default_true")]
    pub self_trade_prevention: bool,

    /// Interval between synthetic book updates.
    #[serde(default = "default_market_interval_ms")]
    pub market_interval_ms: u64,

    /// Levels per side of the synthetic book.
    #[serde(default = "default_depth")]
    pub depth: usize,

    /// Distance from mid to each best level.
    #[serde(default = "default_half_spread")]
    pub half_spread: Price,

    #[serde(default = "default_level_spacing")]
    pub level_spacing: Price,

    #[serde(default = "default_level_size")]
    pub level_size: Size,

    /// Largest mid move per update.
    #[serde(default = "default_max_step")]
    pub max_step: Price,

    /// Chance per update that the resting order nearest to mid is filled.
    #[serde(default = "default_fill_probability")]
    pub fill_probability: f64,

    /// Fixed seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_min_tick() -> Price {
    Price::new(dec!(0.01))
}

fn default_min_size() -> Size {
    Size::new(dec!(0.01))
}

fn default_start_price() -> Price {
    Price::new(dec!(100))
}

fn default_base_balance() -> Decimal {
    dec!(10)
}

fn default_quote_balance() -> Decimal {
    dec!(1000)
}

fn default_true() -> bool {
    true
}

fn default_market_interval_ms() -> u64 {
    1000
}

fn default_depth() -> usize {
    5
}

fn default_half_spread() -> Price {
    Price::new(dec!(0.5))
}

fn default_level_spacing() -> Price {
    Price::new(dec!(0.1))
}

fn default_level_size() -> Size {
    Size::new(dec!(1))
}

fn default_max_step() -> Price {
    Price::new(dec!(0.05))
}

fn default_fill_probability() -> f64 {
    0.05
}

impl Default for NullGatewayConfig {
    fn default() -> Self {
        Self {
            min_tick: default_min_tick(),
            min_size: default_min_size(),
            start_price: default_start_price(),
            base_balance: default_base_balance(),
            quote_balance: default_quote_balance(),
            self_trade_prevention: default_true(),
            market_interval_ms: default_market_interval_ms(),
            depth: default_depth(),
            half_spread: default_half_spread(),
            level_spacing: default_level_spacing(),
            level_size: default_level_size(),
            max_step: default_max_step(),
            fill_probability: default_fill_probability(),
            seed: None,
        }
    }
}

// ============================================================================
// Simulator state
// ============================================================================

#[derive(Debug, Clone)]
struct SimOrder {
    order_id: OrderId,
    exchange_id: String,
    side: Side,
    price: Price,
    leaves: Size,
}

struct Simulator {
    config: NullGatewayConfig,
    pair: CurrencyPair,
    mid: Price,
    resting: Vec<SimOrder>,
    base: CurrencyPosition,
    quote: CurrencyPosition,
    rng: StdRng,
    next_exchange_id: u64,
    events: Option<mpsc::UnboundedSender<GatewayEvent>>,
}

impl Simulator {
    fn new(config: NullGatewayConfig, pair: CurrencyPair) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            mid: config.start_price,
            base: CurrencyPosition::new(pair.base.clone(), config.base_balance, Decimal::ZERO),
            quote: CurrencyPosition::new(pair.quote.clone(), config.quote_balance, Decimal::ZERO),
            pair,
            resting: Vec::new(),
            rng,
            next_exchange_id: 0,
            events: None,
            config,
        }
    }

    fn emit(&self, event: GatewayEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).is_err() {
                debug!("Null gateway event receiver dropped");
            }
        }
    }

    fn emit_positions(&self) {
        self.emit(GatewayEvent::Position(self.base.clone()));
        self.emit(GatewayEvent::Position(self.quote.clone()));
    }

    fn synthetic_best_bid(&self) -> Price {
        (self.mid - self.config.half_spread).round_down(self.config.min_tick)
    }

    fn synthetic_best_ask(&self) -> Price {
        (self.mid + self.config.half_spread).round_up(self.config.min_tick)
    }

    /// Synthetic levels plus our own resting orders.
    fn book(&self, now: DateTime<Utc>) -> MarketUpdate {
        let spacing = self.config.level_spacing;
        let mut bids = Vec::with_capacity(self.config.depth);
        let mut asks = Vec::with_capacity(self.config.depth);
        for i in 0..self.config.depth {
            let n = Decimal::from(i as u64);
            let size = self.config.level_size * (n + Decimal::ONE);
            bids.push(MarketLevel::new(self.synthetic_best_bid() - spacing * n, size));
            asks.push(MarketLevel::new(self.synthetic_best_ask() + spacing * n, size));
        }
        for order in &self.resting {
            let levels = match order.side {
                Side::Bid => &mut bids,
                Side::Ask => &mut asks,
            };
            match levels.iter_mut().find(|l| l.price == order.price) {
                Some(level) => level.size = level.size + order.leaves,
                None => levels.push(MarketLevel::new(order.price, order.leaves)),
            }
        }
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        MarketUpdate::new(now, bids, asks)
    }

    fn reserve(&mut self, side: Side, price: Price, qty: Size) -> bool {
        match side {
            Side::Bid => {
                let cost = qty.notional(price);
                if self.quote.amount < cost {
                    return false;
                }
                self.quote.amount -= cost;
                self.quote.held_amount += cost;
            }
            Side::Ask => {
                if self.base.amount < qty.inner() {
                    return false;
                }
                self.base.amount -= qty.inner();
                self.base.held_amount += qty.inner();
            }
        }
        true
    }

    fn release(&mut self, side: Side, price: Price, qty: Size) {
        match side {
            Side::Bid => {
                let cost = qty.notional(price);
                self.quote.held_amount -= cost;
                self.quote.amount += cost;
            }
            Side::Ask => {
                self.base.held_amount -= qty.inner();
                self.base.amount += qty.inner();
            }
        }
    }

    fn settle(&mut self, side: Side, price: Price, qty: Size) {
        match side {
            Side::Bid => {
                self.quote.held_amount -= qty.notional(price);
                self.base.amount += qty.inner();
            }
            Side::Ask => {
                self.base.held_amount -= qty.inner();
                self.quote.amount += qty.notional(price);
            }
        }
    }

    fn reject(&self, order_id: &OrderId, reason: &str, now: DateTime<Utc>) {
        let mut update = OrderUpdate::status(order_id.clone(), OrderStatus::Rejected, now);
        update.reject_reason = Some(reason.to_string());
        self.emit(GatewayEvent::Order(update));
    }

    fn place(&mut self, order: &Order, now: DateTime<Utc>) {
        if order.quantity < self.config.min_size {
            self.reject(&order.order_id, "below minimum size", now);
            return;
        }
        if !self.reserve(order.side, order.price, order.quantity) {
            self.reject(&order.order_id, "insufficient balance", now);
            return;
        }
        self.next_exchange_id += 1;
        let exchange_id = format!("null-{}", self.next_exchange_id);
        let mut ack = OrderUpdate::status(order.order_id.clone(), OrderStatus::Working, now);
        ack.exchange_id = Some(exchange_id.clone());
        ack.leaves_quantity = Some(order.quantity);
        self.emit(GatewayEvent::Order(ack));

        self.resting.push(SimOrder {
            order_id: order.order_id.clone(),
            exchange_id,
            side: order.side,
            price: order.price,
            leaves: order.quantity,
        });
        self.emit_positions();
        self.fill_crossing(now);
    }

    fn cancel(&mut self, order_id: &OrderId, now: DateTime<Utc>) {
        let Some(idx) = self.resting.iter().position(|o| &o.order_id == order_id) else {
            // Already filled or never accepted; the earlier report stands.
            return;
        };
        let order = self.resting.remove(idx);
        self.release(order.side, order.price, order.leaves);
        self.emit(GatewayEvent::Order(OrderUpdate::status(
            order.order_id,
            OrderStatus::Cancelled,
            now,
        )));
        self.emit_positions();
    }

    fn replace(&mut self, order_id: &OrderId, price: Price, qty: Size, now: DateTime<Utc>) {
        let Some(idx) = self.resting.iter().position(|o| &o.order_id == order_id) else {
            return;
        };
        let old = self.resting[idx].clone();
        self.release(old.side, old.price, old.leaves);
        if qty < self.config.min_size || !self.reserve(old.side, price, qty) {
            self.resting.remove(idx);
            warn!(order_id = %order_id, "Null gateway replace refused, cancelling order");
            self.emit(GatewayEvent::Order(OrderUpdate::status(
                order_id.clone(),
                OrderStatus::Cancelled,
                now,
            )));
            self.emit_positions();
            return;
        }
        self.resting[idx].price = price;
        self.resting[idx].leaves = qty;
        let mut ack = OrderUpdate::status(order_id.clone(), OrderStatus::Working, now);
        ack.exchange_id = Some(old.exchange_id);
        ack.price = Some(price);
        ack.quantity = Some(qty);
        ack.leaves_quantity = Some(qty);
        self.emit(GatewayEvent::Order(ack));
        self.emit_positions();
        self.fill_crossing(now);
    }

    fn fill(&mut self, idx: usize, now: DateTime<Utc>) {
        let order = self.resting.remove(idx);
        self.settle(order.side, order.price, order.leaves);
        debug!(
            order_id = %order.order_id,
            side = %order.side,
            price = %order.price,
            quantity = %order.leaves,
            "Null gateway fill"
        );
        self.emit(GatewayEvent::Order(OrderUpdate::fill(
            order.order_id,
            OrderStatus::Complete,
            now,
            order.price,
            order.leaves,
            Size::ZERO,
        )));
        // Our fill is also a print on the public tape.
        self.emit(GatewayEvent::MarketTrade(GatewayMarketTrade {
            time: now,
            price: order.price,
            size: order.leaves,
            make_side: order.side,
        }));
        self.emit_positions();
    }

    /// Fill every resting order that crosses the synthetic book.
    fn fill_crossing(&mut self, now: DateTime<Utc>) {
        let best_bid = self.synthetic_best_bid();
        let best_ask = self.synthetic_best_ask();
        while let Some(idx) = self.resting.iter().position(|o| match o.side {
            Side::Bid => o.price >= best_ask,
            Side::Ask => o.price <= best_bid,
        }) {
            self.fill(idx, now);
        }
    }

    /// Move the mid, fill what the new book crosses and publish it.
    fn step(&mut self, now: DateTime<Utc>) {
        let ticks = self.rng.gen_range(-1i64..=1);
        let next = self.mid + self.config.max_step * Decimal::from(ticks);
        if next.is_positive() {
            self.mid = next.round_nearest(self.config.min_tick);
        }
        self.fill_crossing(now);

        if !self.resting.is_empty() && self.rng.gen_bool(self.config.fill_probability.clamp(0.0, 1.0)) {
            let mid = self.mid;
            let nearest = self
                .resting
                .iter()
                .enumerate()
                .min_by_key(|(_, o)| (o.price.inner() - mid.inner()).abs())
                .map(|(idx, _)| idx);
            if let Some(idx) = nearest {
                self.fill(idx, now);
            }
        }
        let book = self.book(now);
        self.emit(GatewayEvent::MarketData(book));
    }
}

// ============================================================================
// Gateway
// ============================================================================

pub struct NullGateway {
    details: GatewayDetails,
    sim: Arc<Mutex<Simulator>>,
    shutdown: Mutex<CancellationToken>,
}

impl NullGateway {
    pub fn new(pair: CurrencyPair, config: NullGatewayConfig) -> Self {
        let details = GatewayDetails {
            name: "Null".to_string(),
            pair: pair.clone(),
            min_tick: config.min_tick,
            min_size: config.min_size,
            has_self_trade_prevention: config.self_trade_prevention,
            supports_replace: true,
        };
        Self {
            details,
            sim: Arc::new(Mutex::new(Simulator::new(config, pair))),
            shutdown: Mutex::new(CancellationToken::new()),
        }
    }

    fn connected_sim(&self) -> BrokerResult<parking_lot::MutexGuard<'_, Simulator>> {
        let sim = self.sim.lock();
        if sim.events.is_none() {
            return Err(BrokerError::NotConnected);
        }
        Ok(sim)
    }
}

impl CombinedGateway for NullGateway {
    fn details(&self) -> &GatewayDetails {
        &self.details
    }

    fn connect(&self, events: mpsc::UnboundedSender<GatewayEvent>) -> BrokerResult<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| BrokerError::Gateway(format!("no async runtime: {e}")))?;
        let interval_ms = {
            let mut sim = self.sim.lock();
            sim.events = Some(events);
            sim.emit(GatewayEvent::Connectivity(ConnectivityStatus::Connected));
            sim.emit_positions();
            let now = Utc::now();
            let book = sim.book(now);
            sim.emit(GatewayEvent::MarketData(book));
            sim.config.market_interval_ms.max(1)
        };

        let token = CancellationToken::new();
        *self.shutdown.lock() = token.clone();
        let sim = self.sim.clone();
        handle.spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => sim.lock().step(Utc::now()),
                }
            }
            debug!("Null gateway market feed stopped");
        });
        info!(pair = %self.details.pair, "Null gateway connected");
        Ok(())
    }

    fn disconnect(&self) {
        self.shutdown.lock().cancel();
        let mut sim = self.sim.lock();
        sim.emit(GatewayEvent::Connectivity(ConnectivityStatus::Disconnected));
        sim.events = None;
        info!("Null gateway disconnected");
    }

    fn send_order(&self, order: &Order) -> BrokerResult<()> {
        self.connected_sim()?.place(order, Utc::now());
        Ok(())
    }

    fn cancel_order(&self, order: &Order) -> BrokerResult<()> {
        self.connected_sim()?.cancel(&order.order_id, Utc::now());
        Ok(())
    }

    fn replace_order(&self, order: &Order, price: Price, quantity: Size) -> BrokerResult<()> {
        self.connected_sim()?
            .replace(&order.order_id, price, quantity, Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tribeca_core::{OrderType, TimeInForce};

    fn gateway() -> NullGateway {
        NullGateway::new(
            CurrencyPair::new("BTC", "USD"),
            NullGatewayConfig {
                market_interval_ms: 60_000,
                fill_probability: 0.0,
                seed: Some(7),
                ..Default::default()
            },
        )
    }

    fn order(side: Side, px: Decimal, qty: Decimal) -> Order {
        let now = Utc::now();
        Order {
            order_id: OrderId::generate(),
            exchange_id: None,
            exchange: "Null".to_string(),
            pair: CurrencyPair::new("BTC", "USD"),
            side,
            price: Price::new(px),
            quantity: Size::new(qty),
            leaves_quantity: Size::new(qty),
            filled_quantity: Size::ZERO,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::GoodTilCancelled,
            status: OrderStatus::New,
            created_at: now,
            updated_at: now,
            latency_ms: None,
            pending_cancel: false,
            pending_replace: false,
            reject_reason: None,
        }
    }

    fn order_updates(rx: &mut mpsc::UnboundedReceiver<GatewayEvent>) -> Vec<OrderUpdate> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let GatewayEvent::Order(update) = event {
                out.push(update);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_connect_emits_initial_state() {
        let gw = gateway();
        let (tx, mut rx) = mpsc::unbounded_channel();
        gw.connect(tx).unwrap();

        let mut saw_connected = false;
        let mut positions = 0;
        let mut books = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                GatewayEvent::Connectivity(ConnectivityStatus::Connected) => saw_connected = true,
                GatewayEvent::Position(_) => positions += 1,
                GatewayEvent::MarketData(book) => {
                    assert!(!book.is_crossed());
                    assert_eq!(book.bids.len(), 5);
                    books += 1;
                }
                _ => {}
            }
        }
        assert!(saw_connected);
        assert_eq!(positions, 2);
        assert_eq!(books, 1);
        gw.disconnect();
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let gw = gateway();
        assert!(matches!(
            gw.send_order(&order(Side::Bid, dec!(99), dec!(1))),
            Err(BrokerError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_resting_order_then_cancel() {
        let gw = gateway();
        let (tx, mut rx) = mpsc::unbounded_channel();
        gw.connect(tx).unwrap();
        order_updates(&mut rx);

        let o = order(Side::Bid, dec!(99), dec!(1));
        gw.send_order(&o).unwrap();
        let updates = order_updates(&mut rx);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].status, OrderStatus::Working);
        assert!(updates[0].exchange_id.is_some());

        gw.cancel_order(&o).unwrap();
        let updates = order_updates(&mut rx);
        assert_eq!(updates[0].status, OrderStatus::Cancelled);

        // Cancelling again is silent.
        gw.cancel_order(&o).unwrap();
        assert!(order_updates(&mut rx).is_empty());
        gw.disconnect();
    }

    #[tokio::test]
    async fn test_crossing_order_fills() {
        let gw = gateway();
        let (tx, mut rx) = mpsc::unbounded_channel();
        gw.connect(tx).unwrap();
        order_updates(&mut rx);

        let o = order(Side::Bid, dec!(101), dec!(1));
        gw.send_order(&o).unwrap();
        let updates = order_updates(&mut rx);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].status, OrderStatus::Complete);
        assert_eq!(updates[1].last_quantity, Some(Size::new(dec!(1))));
        gw.disconnect();
    }

    #[tokio::test]
    async fn test_fill_prints_market_trade() {
        let gw = gateway();
        let (tx, mut rx) = mpsc::unbounded_channel();
        gw.connect(tx).unwrap();
        order_updates(&mut rx);

        gw.send_order(&order(Side::Bid, dec!(101), dec!(1))).unwrap();
        let mut prints = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let GatewayEvent::MarketTrade(print) = event {
                prints.push(print);
            }
        }
        assert_eq!(prints.len(), 1);
        assert_eq!(prints[0].price, Price::new(dec!(101)));
        assert_eq!(prints[0].size, Size::new(dec!(1)));
        assert_eq!(prints[0].make_side, Side::Bid);
        gw.disconnect();
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejects() {
        let gw = gateway();
        let (tx, mut rx) = mpsc::unbounded_channel();
        gw.connect(tx).unwrap();
        order_updates(&mut rx);

        gw.send_order(&order(Side::Ask, dec!(150), dec!(500))).unwrap();
        let updates = order_updates(&mut rx);
        assert_eq!(updates[0].status, OrderStatus::Rejected);
        assert_eq!(updates[0].reject_reason.as_deref(), Some("insufficient balance"));
        gw.disconnect();
    }

    #[tokio::test]
    async fn test_replace_moves_order() {
        let gw = gateway();
        let (tx, mut rx) = mpsc::unbounded_channel();
        gw.connect(tx).unwrap();
        order_updates(&mut rx);

        let o = order(Side::Ask, dec!(102), dec!(1));
        gw.send_order(&o).unwrap();
        order_updates(&mut rx);
        gw.replace_order(&o, Price::new(dec!(103)), Size::new(dec!(2)))
            .unwrap();
        let updates = order_updates(&mut rx);
        assert_eq!(updates[0].status, OrderStatus::Working);
        assert_eq!(updates[0].price, Some(Price::new(dec!(103))));
        assert_eq!(updates[0].leaves_quantity, Some(Size::new(dec!(2))));
        gw.disconnect();
    }
}
