//! Order broker: the single owner of order state.
//!
//! Every mutation of an order goes through this type. Status only moves on
//! exchange acknowledgements; sending a command just marks the order as
//! having a command outstanding. Fills become `Trade` records which are
//! appended to the in-memory ledger, persisted and published.

use crate::error::{BrokerError, BrokerResult};
use crate::gateway::{CombinedGateway, GatewayDetails};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tribeca_bus::{MessageBus, Publisher, Topic};
use tribeca_core::{
    NewOrderRequest, Order, OrderId, OrderStatus, OrderStatusReport, OrderUpdate, PongAt, Price,
    Side, Size, Trade,
};
use tribeca_persistence::Persister;
use tribeca_telemetry::Metrics;

// ============================================================================
// Ledger
// ============================================================================

/// Trade plus the quantity already paired with opposite-side fills.
#[derive(Debug, Clone)]
struct LedgerEntry {
    trade: Trade,
    matched: Size,
}

impl LedgerEntry {
    fn unmatched(&self) -> Size {
        self.trade.quantity - self.matched
    }
}

#[derive(Debug, Default)]
struct TradeLedger {
    entries: Vec<LedgerEntry>,
}

impl TradeLedger {
    /// Pair a new fill against open fills of the other side that it closes
    /// at a profit. `pong_at` decides whether the nearest or the furthest
    /// ping is closed first.
    fn match_pings(&mut self, new_idx: usize, pong_at: PongAt) {
        let (new_side, new_price) = {
            let e = &self.entries[new_idx];
            (e.trade.side, e.trade.price)
        };
        let mut candidates: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(idx, e)| {
                *idx != new_idx
                    && e.trade.side == new_side.opposite()
                    && e.unmatched().is_positive()
                    && match new_side {
                        Side::Ask => e.trade.price < new_price,
                        Side::Bid => e.trade.price > new_price,
                    }
            })
            .map(|(idx, _)| idx)
            .collect();

        let distance = |idx: &usize| (self.entries[*idx].trade.price.inner() - new_price.inner()).abs();
        if pong_at.is_short() {
            candidates.sort_by_key(distance);
        } else {
            candidates.sort_by_key(|idx| std::cmp::Reverse(distance(idx)));
        }

        let mut remaining = self.entries[new_idx].unmatched();
        for idx in candidates {
            if !remaining.is_positive() {
                break;
            }
            let qty = remaining.min(self.entries[idx].unmatched());
            self.entries[idx].matched = self.entries[idx].matched + qty;
            self.entries[new_idx].matched = self.entries[new_idx].matched + qty;
            remaining = remaining - qty;
            debug!(
                ping = %self.entries[idx].trade.trade_id,
                pong = %self.entries[new_idx].trade.trade_id,
                quantity = %qty,
                "Matched pong"
            );
        }
    }
}

/// Result of applying an acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUpdateOutcome {
    pub report: OrderStatusReport,
    pub trade: Option<Trade>,
}

// ============================================================================
// OrderBroker
// ============================================================================

pub struct OrderBroker {
    gateway: Arc<dyn CombinedGateway>,
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    ledger: Arc<RwLock<TradeLedger>>,
    trade_store: Arc<dyn Persister<Trade>>,
    status_publisher: Publisher<OrderStatusReport>,
    trade_publisher: Publisher<Trade>,
    trade_seq: u64,
}

impl OrderBroker {
    /// Create the broker, seed the ledger with `history` and register the
    /// order-status and trade snapshots.
    pub fn new(
        gateway: Arc<dyn CombinedGateway>,
        bus: &MessageBus,
        trade_store: Arc<dyn Persister<Trade>>,
        history: Vec<Trade>,
    ) -> BrokerResult<Self> {
        let orders: Arc<RwLock<HashMap<OrderId, Order>>> = Arc::default();
        let ledger = Arc::new(RwLock::new(TradeLedger {
            entries: history
                .into_iter()
                .map(|trade| LedgerEntry {
                    trade,
                    matched: Size::ZERO,
                })
                .collect(),
        }));

        let status_publisher = bus.publisher::<OrderStatusReport>(Topic::OrderStatusReports);
        let snapshot_orders = orders.clone();
        status_publisher.register_snapshot(move || {
            let orders = snapshot_orders.read();
            let mut reports: Vec<_> = orders.values().map(OrderStatusReport::from).collect();
            reports.sort_by_key(|r| r.time);
            reports
        })?;

        let trade_publisher = bus.publisher::<Trade>(Topic::Trades);
        let snapshot_ledger = ledger.clone();
        trade_publisher.register_snapshot(move || {
            snapshot_ledger
                .read()
                .entries
                .iter()
                .map(|e| e.trade.clone())
                .collect()
        })?;

        let trade_seq = ledger.read().entries.len() as u64;
        Ok(Self {
            gateway,
            orders,
            ledger,
            trade_store,
            status_publisher,
            trade_publisher,
            trade_seq,
        })
    }

    pub fn details(&self) -> &GatewayDetails {
        self.gateway.details()
    }

    fn publish(&self, order: &Order) {
        self.status_publisher.publish(&OrderStatusReport::from(order));
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Register a new order in state `New` and send it.
    ///
    /// A gateway failure marks the order `Rejected`; it is published and
    /// not retried.
    pub fn submit(&mut self, request: NewOrderRequest, now: DateTime<Utc>) -> BrokerResult<OrderId> {
        let details = self.gateway.details();
        if !request.price.is_positive() || !request.quantity.is_positive() {
            return Err(BrokerError::InvalidOrder(format!(
                "price {} and quantity {} must be positive",
                request.price, request.quantity
            )));
        }
        let mut order = Order {
            order_id: OrderId::generate(),
            exchange_id: None,
            exchange: details.name.clone(),
            pair: details.pair.clone(),
            side: request.side,
            price: request.price,
            quantity: request.quantity,
            leaves_quantity: request.quantity,
            filled_quantity: Size::ZERO,
            order_type: request.order_type,
            time_in_force: request.time_in_force,
            status: OrderStatus::New,
            created_at: now,
            updated_at: now,
            latency_ms: None,
            pending_cancel: false,
            pending_replace: false,
            reject_reason: None,
        };

        let sent = self.gateway.send_order(&order);
        Metrics::order_command("new");
        let order_id = order.order_id.clone();
        if let Err(e) = &sent {
            warn!(
                order_id = %order_id,
                side = %order.side,
                price = %order.price,
                error = %e,
                "Order rejected by gateway"
            );
            order.status = OrderStatus::Rejected;
            order.reject_reason = Some(e.to_string());
            Metrics::order_update("Rejected");
        } else {
            debug!(
                order_id = %order_id,
                side = %order.side,
                price = %order.price,
                quantity = %order.quantity,
                "Order sent"
            );
        }
        self.publish(&order);
        self.orders.write().insert(order_id.clone(), order);
        sent.map(|_| order_id)
    }

    /// Amend a working order in place.
    pub fn replace(
        &mut self,
        order_id: &OrderId,
        price: Price,
        quantity: Size,
        now: DateTime<Utc>,
    ) -> BrokerResult<()> {
        let mut orders = self.orders.write();
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| BrokerError::UnknownOrder(order_id.clone()))?;
        if order.status.is_terminal() || order.has_outstanding_command() {
            return Err(BrokerError::InvalidState {
                order_id: order_id.clone(),
                status: order.status,
                action: "replace",
            });
        }
        self.gateway.replace_order(order, price, quantity)?;
        Metrics::order_command("replace");
        order.pending_replace = true;
        order.updated_at = now;
        debug!(order_id = %order_id, price = %price, quantity = %quantity, "Replace sent");
        Ok(())
    }

    /// Request cancellation. Returns `false` when a cancel is already pending
    /// or the order is no longer live.
    pub fn cancel(&mut self, order_id: &OrderId, now: DateTime<Utc>) -> BrokerResult<bool> {
        let mut orders = self.orders.write();
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| BrokerError::UnknownOrder(order_id.clone()))?;
        if order.status.is_terminal() || order.pending_cancel {
            return Ok(false);
        }
        self.gateway.cancel_order(order)?;
        Metrics::order_command("cancel");
        order.pending_cancel = true;
        order.updated_at = now;
        debug!(order_id = %order_id, "Cancel sent");
        Ok(true)
    }

    /// Send a cancel for every live order. Returns how many were requested.
    pub fn cancel_all(&mut self, now: DateTime<Utc>) -> usize {
        let ids: Vec<OrderId> = self.live_orders().into_iter().map(|o| o.order_id).collect();
        let mut requested = 0;
        for id in ids {
            match self.cancel(&id, now) {
                Ok(true) => requested += 1,
                Ok(false) => {}
                Err(e) => warn!(order_id = %id, error = %e, "Failed to cancel order"),
            }
        }
        info!(requested, "Cancel-all sent");
        requested
    }

    /// Drop terminal orders kept for display. Returns how many were purged.
    pub fn clean_closed(&mut self) -> usize {
        let mut orders = self.orders.write();
        let before = orders.len();
        orders.retain(|_, o| o.status.is_live());
        let purged = before - orders.len();
        info!(purged, "Cleaned closed orders");
        purged
    }

    /// Purge terminal orders and clear the trade ledger.
    ///
    /// With `pings_only` only unmatched fills are forgotten, so fills that
    /// were already paired into a completed ping/pong stay in the history.
    pub fn clean_all(&mut self, pings_only: bool) -> usize {
        let purged_orders = self.clean_closed();
        let mut ledger = self.ledger.write();
        let before = ledger.entries.len();
        if pings_only {
            ledger.entries.retain(|e| !e.unmatched().is_positive());
        } else {
            ledger.entries.clear();
        }
        let purged_trades = before - ledger.entries.len();
        info!(purged_orders, purged_trades, pings_only, "Cleaned order history");
        purged_orders + purged_trades
    }

    /// Recompute ping/pong pairing of the whole ledger in time order.
    ///
    /// Pairing is not persisted, so it is rebuilt after loading history.
    pub fn replay_matching(&mut self, pong_at: PongAt) {
        let mut ledger = self.ledger.write();
        ledger.entries.sort_by_key(|e| e.trade.time);
        for entry in ledger.entries.iter_mut() {
            entry.matched = Size::ZERO;
        }
        for idx in 0..ledger.entries.len() {
            ledger.match_pings(idx, pong_at);
        }
    }

    // ------------------------------------------------------------------------
    // Acknowledgements
    // ------------------------------------------------------------------------

    /// Apply an exchange acknowledgement.
    ///
    /// Illegal transitions and updates for unknown orders are logged and
    /// ignored. `pong_at` is set in ping/pong modes, where every fill is
    /// paired against the open fills of the other side.
    pub fn on_order_update(
        &mut self,
        update: OrderUpdate,
        pong_at: Option<PongAt>,
    ) -> Option<OrderUpdateOutcome> {
        let mut orders = self.orders.write();
        let Some(order) = orders.get_mut(&update.order_id) else {
            warn!(order_id = %update.order_id, status = %update.status, "Update for unknown order");
            return None;
        };
        if !order.status.can_transition_to(update.status) {
            warn!(
                order_id = %order.order_id,
                from = %order.status,
                to = %update.status,
                "Ignoring illegal order transition"
            );
            return None;
        }

        if order.status == OrderStatus::New && order.latency_ms.is_none() {
            let latency = (update.time - order.created_at).num_milliseconds().max(0);
            order.latency_ms = Some(latency);
            Metrics::order_latency(latency as f64);
        }

        order.status = update.status;
        order.updated_at = update.time;
        if update.exchange_id.is_some() {
            order.exchange_id = update.exchange_id.clone();
        }
        if let Some(price) = update.price {
            order.price = price;
        }
        if let Some(quantity) = update.quantity {
            order.quantity = quantity;
        }
        if update.status == OrderStatus::Working {
            order.pending_replace = false;
        }
        if update.status.is_terminal() {
            order.pending_cancel = false;
            order.pending_replace = false;
        }

        let mut trade = None;
        if let (Some(qty), Some(px)) = (update.last_quantity, update.last_price) {
            if qty.is_positive() {
                order.filled_quantity = order.filled_quantity + qty;
                self.trade_seq += 1;
                trade = Some(Trade {
                    trade_id: format!("{}-{}", order.order_id, self.trade_seq),
                    order_id: order.order_id.clone(),
                    time: update.time,
                    pair: order.pair.clone(),
                    side: order.side,
                    price: px,
                    quantity: qty,
                });
            }
        }
        order.leaves_quantity = match update.leaves_quantity {
            Some(leaves) => leaves,
            None if update.status == OrderStatus::Complete => Size::ZERO,
            None => order.quantity - order.filled_quantity,
        };

        if update.status == OrderStatus::Rejected {
            order.reject_reason = update.reject_reason.clone();
            warn!(
                order_id = %order.order_id,
                reason = update.reject_reason.as_deref().unwrap_or("unknown"),
                "Order rejected"
            );
        }
        Metrics::order_update(&update.status.to_string());

        let report = OrderStatusReport::from(&*order);
        drop(orders);
        self.status_publisher.publish(&report);

        if let Some(trade) = &trade {
            self.record_trade(trade.clone(), pong_at);
        }

        Some(OrderUpdateOutcome { report, trade })
    }

    fn record_trade(&mut self, trade: Trade, pong_at: Option<PongAt>) {
        info!(
            trade_id = %trade.trade_id,
            side = %trade.side,
            price = %trade.price,
            quantity = %trade.quantity,
            "Fill"
        );
        Metrics::trade(&trade.side.to_string());
        {
            let mut ledger = self.ledger.write();
            ledger.entries.push(LedgerEntry {
                trade: trade.clone(),
                matched: Size::ZERO,
            });
            if let Some(pong_at) = pong_at {
                let idx = ledger.entries.len() - 1;
                ledger.match_pings(idx, pong_at);
            }
        }
        if let Err(e) = self.trade_store.save(&trade) {
            warn!(trade_id = %trade.trade_id, error = %e, "Failed to persist trade");
        }
        self.trade_publisher.publish(&trade);
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn order(&self, order_id: &OrderId) -> Option<Order> {
        self.orders.read().get(order_id).cloned()
    }

    /// Orders not yet in a terminal state, oldest first.
    pub fn live_orders(&self) -> Vec<Order> {
        let mut live: Vec<Order> = self
            .orders
            .read()
            .values()
            .filter(|o| o.status.is_live())
            .cloned()
            .collect();
        live.sort_by_key(|o| o.created_at);
        live
    }

    pub fn live_count(&self) -> usize {
        self.orders
            .read()
            .values()
            .filter(|o| o.status.is_live())
            .count()
    }

    pub fn all_orders_count(&self) -> usize {
        self.orders.read().len()
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.ledger
            .read()
            .entries
            .iter()
            .map(|e| e.trade.clone())
            .collect()
    }

    /// Unmatched quantity of each fill on `side`, as `(price, quantity)`.
    pub fn open_pings(&self, side: Side) -> Vec<(Price, Size)> {
        self.ledger
            .read()
            .entries
            .iter()
            .filter(|e| e.trade.side == side && e.unmatched().is_positive())
            .map(|e| (e.trade.price, e.unmatched()))
            .collect()
    }
}
