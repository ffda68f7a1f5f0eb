//! Per-side quote placement.
//!
//! The quoter only remembers which order ids it placed on each side; the
//! order broker owns everything else about them. While any order of a
//! side has a command in flight, new requests for that side are skipped
//! until the exchange answers, so a side never has more than one
//! outstanding amendment.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};
use tribeca_broker::OrderBroker;
use tribeca_core::{
    NewOrderRequest, Order, OrderId, OrderStatus, Quote, QuotingMode, QuotingParameters, Side,
};

/// What `update_quote` / `cancel_quote` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteAction {
    Submitted,
    Replaced,
    Cancelled,
    /// The resting order already matches.
    Unchanged,
    /// A command for this side is still awaiting acknowledgement.
    Pending,
    /// The broker refused the command.
    Failed,
}

#[derive(Debug, Default)]
pub struct Quoter {
    bids: Vec<OrderId>,
    asks: Vec<OrderId>,
}

impl Quoter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_ids(&self, side: Side) -> &[OrderId] {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn ids_mut(&mut self, side: Side) -> &mut Vec<OrderId> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    /// Live orders of `side`. Ids of orders that reached a terminal state
    /// are forgotten.
    fn live(&mut self, side: Side, broker: &OrderBroker) -> Vec<Order> {
        let mut live = Vec::new();
        self.ids_mut(side).retain(|id| match broker.order(id) {
            Some(order) if order.status.is_live() => {
                live.push(order);
                true
            }
            _ => false,
        });
        live
    }

    /// True when an order of `side` is resting or being placed.
    pub fn has_live_quote(&mut self, side: Side, broker: &OrderBroker) -> bool {
        !self.live(side, broker).is_empty()
    }

    /// Bring `side` to `quote`. Calling again with the same quote is a no-op.
    pub fn update_quote(
        &mut self,
        side: Side,
        quote: Quote,
        params: &QuotingParameters,
        broker: &mut OrderBroker,
        now: DateTime<Utc>,
    ) -> QuoteAction {
        let live = self.live(side, broker);
        if live.iter().any(Order::has_outstanding_command) {
            return QuoteAction::Pending;
        }
        if params.mode == QuotingMode::Ak47 {
            return self.update_bullets(side, quote, params, &live, broker, now);
        }

        let Some((first, extra)) = live.split_first() else {
            return self.submit(side, quote, broker, now);
        };
        if !extra.is_empty() {
            // Left over from a multi-order mode.
            for order in extra {
                Self::cancel_order(order, broker, now);
            }
            return QuoteAction::Cancelled;
        }
        if first.price == quote.price && first.quantity == quote.size {
            return QuoteAction::Unchanged;
        }
        self.amend(first, quote, broker, now)
    }

    /// AK47: keep up to `bullets` orders per side, at least `range` apart.
    fn update_bullets(
        &mut self,
        side: Side,
        quote: Quote,
        params: &QuotingParameters,
        live: &[Order],
        broker: &mut OrderBroker,
        now: DateTime<Utc>,
    ) -> QuoteAction {
        let distance = |o: &Order| (o.price.inner() - quote.price.inner()).abs();
        let range = params.range.inner();
        if live
            .iter()
            .any(|o| distance(o) < range || distance(o) == Decimal::ZERO)
        {
            return QuoteAction::Unchanged;
        }
        if live.len() < params.bullets as usize {
            return self.submit(side, quote, broker, now);
        }
        match live.iter().max_by_key(|o| distance(o)) {
            Some(furthest) => self.amend(furthest, quote, broker, now),
            None => QuoteAction::Unchanged,
        }
    }

    /// Replace in place when the exchange supports it; otherwise cancel and
    /// let a later recompute place the new order.
    fn amend(
        &mut self,
        order: &Order,
        quote: Quote,
        broker: &mut OrderBroker,
        now: DateTime<Utc>,
    ) -> QuoteAction {
        if !broker.details().supports_replace {
            return Self::cancel_order(order, broker, now);
        }
        match broker.replace(&order.order_id, quote.price, quote.size, now) {
            Ok(()) => QuoteAction::Replaced,
            Err(e) => {
                warn!(order_id = %order.order_id, error = %e, "Replace failed");
                QuoteAction::Failed
            }
        }
    }

    fn submit(
        &mut self,
        side: Side,
        quote: Quote,
        broker: &mut OrderBroker,
        now: DateTime<Utc>,
    ) -> QuoteAction {
        match broker.submit(NewOrderRequest::limit(side, quote.price, quote.size), now) {
            Ok(order_id) => {
                debug!(side = %side, price = %quote.price, size = %quote.size, "Quote placed");
                self.ids_mut(side).push(order_id);
                QuoteAction::Submitted
            }
            // Already reported as rejected by the broker.
            Err(_) => QuoteAction::Failed,
        }
    }

    fn cancel_order(order: &Order, broker: &mut OrderBroker, now: DateTime<Utc>) -> QuoteAction {
        match broker.cancel(&order.order_id, now) {
            Ok(true) => QuoteAction::Cancelled,
            Ok(false) => QuoteAction::Pending,
            Err(e) => {
                warn!(order_id = %order.order_id, error = %e, "Cancel failed");
                QuoteAction::Failed
            }
        }
    }

    /// Pull every order of `side`.
    pub fn cancel_quote(
        &mut self,
        side: Side,
        broker: &mut OrderBroker,
        now: DateTime<Utc>,
    ) -> QuoteAction {
        let live = self.live(side, broker);
        if live
            .iter()
            .any(|o| o.status == OrderStatus::New || o.pending_replace)
        {
            return QuoteAction::Pending;
        }
        let mut action = QuoteAction::Unchanged;
        for order in live.iter().filter(|o| !o.pending_cancel) {
            if Self::cancel_order(order, broker, now) == QuoteAction::Cancelled {
                action = QuoteAction::Cancelled;
            }
        }
        if action == QuoteAction::Cancelled {
            debug!(side = %side, "Quote pulled");
        }
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tribeca_broker::{GatewayCommand, GatewayDetails, RecordingGateway};
    use tribeca_bus::MessageBus;
    use tribeca_core::{CurrencyPair, OrderUpdate, Price, Size, Trade};
    use tribeca_persistence::MemoryStore;

    fn setup(supports_replace: bool) -> (Arc<RecordingGateway>, OrderBroker) {
        let gateway = Arc::new(RecordingGateway::new(GatewayDetails {
            name: "Test".into(),
            pair: CurrencyPair::new("BTC", "USD"),
            min_tick: Price::new(dec!(0.01)),
            min_size: Size::new(dec!(0.01)),
            has_self_trade_prevention: false,
            supports_replace,
        }));
        let broker = OrderBroker::new(
            gateway.clone(),
            &MessageBus::null(),
            Arc::new(MemoryStore::<Trade>::new()),
            Vec::new(),
        )
        .unwrap();
        (gateway, broker)
    }

    fn quote(px: rust_decimal::Decimal) -> Quote {
        Quote::new(Price::new(px), Size::new(dec!(1)))
    }

    fn ack(broker: &mut OrderBroker, id: &OrderId, status: OrderStatus) {
        broker.on_order_update(OrderUpdate::status(id.clone(), status, Utc::now()), None);
    }

    fn mode(mode: QuotingMode) -> QuotingParameters {
        QuotingParameters {
            mode,
            bullets: 2,
            range: Price::new(dec!(0.5)),
            ..Default::default()
        }
    }

    #[test]
    fn test_identical_update_sends_once() {
        let (gw, mut broker) = setup(true);
        let mut quoter = Quoter::new();
        let p = mode(QuotingMode::Top);
        let now = Utc::now();

        assert_eq!(
            quoter.update_quote(Side::Bid, quote(dec!(99)), &p, &mut broker, now),
            QuoteAction::Submitted
        );
        assert_eq!(
            quoter.update_quote(Side::Bid, quote(dec!(99)), &p, &mut broker, now),
            QuoteAction::Pending
        );
        let id = quoter.order_ids(Side::Bid)[0].clone();
        ack(&mut broker, &id, OrderStatus::Working);
        assert_eq!(
            quoter.update_quote(Side::Bid, quote(dec!(99)), &p, &mut broker, now),
            QuoteAction::Unchanged
        );
        assert_eq!(gw.commands().len(), 1);
    }

    #[test]
    fn test_price_change_replaces() {
        let (gw, mut broker) = setup(true);
        let mut quoter = Quoter::new();
        let p = mode(QuotingMode::Top);
        let now = Utc::now();
        quoter.update_quote(Side::Ask, quote(dec!(101)), &p, &mut broker, now);
        let id = quoter.order_ids(Side::Ask)[0].clone();
        ack(&mut broker, &id, OrderStatus::Working);

        assert_eq!(
            quoter.update_quote(Side::Ask, quote(dec!(102)), &p, &mut broker, now),
            QuoteAction::Replaced
        );
        // Replace in flight: further changes wait.
        assert_eq!(
            quoter.update_quote(Side::Ask, quote(dec!(103)), &p, &mut broker, now),
            QuoteAction::Pending
        );
        assert!(matches!(
            gw.commands().last(),
            Some(GatewayCommand::Replace { price, .. }) if *price == Price::new(dec!(102))
        ));
    }

    #[test]
    fn test_without_replace_cancels_then_places() {
        let (gw, mut broker) = setup(false);
        let mut quoter = Quoter::new();
        let p = mode(QuotingMode::Top);
        let now = Utc::now();
        quoter.update_quote(Side::Bid, quote(dec!(99)), &p, &mut broker, now);
        let id = quoter.order_ids(Side::Bid)[0].clone();
        ack(&mut broker, &id, OrderStatus::Working);

        assert_eq!(
            quoter.update_quote(Side::Bid, quote(dec!(98)), &p, &mut broker, now),
            QuoteAction::Cancelled
        );
        ack(&mut broker, &id, OrderStatus::Cancelled);
        assert_eq!(
            quoter.update_quote(Side::Bid, quote(dec!(98)), &p, &mut broker, now),
            QuoteAction::Submitted
        );
        assert_eq!(quoter.order_ids(Side::Bid).len(), 1);
        assert_eq!(gw.commands().len(), 3);
    }

    #[test]
    fn test_cancel_quote() {
        let (_gw, mut broker) = setup(true);
        let mut quoter = Quoter::new();
        let p = mode(QuotingMode::Top);
        let now = Utc::now();
        assert_eq!(
            quoter.cancel_quote(Side::Bid, &mut broker, now),
            QuoteAction::Unchanged
        );
        quoter.update_quote(Side::Bid, quote(dec!(99)), &p, &mut broker, now);
        // Not acknowledged yet.
        assert_eq!(
            quoter.cancel_quote(Side::Bid, &mut broker, now),
            QuoteAction::Pending
        );
        let id = quoter.order_ids(Side::Bid)[0].clone();
        ack(&mut broker, &id, OrderStatus::Working);
        assert_eq!(
            quoter.cancel_quote(Side::Bid, &mut broker, now),
            QuoteAction::Cancelled
        );
        assert_eq!(
            quoter.cancel_quote(Side::Bid, &mut broker, now),
            QuoteAction::Unchanged
        );
        ack(&mut broker, &id, OrderStatus::Cancelled);
        assert!(!quoter.has_live_quote(Side::Bid, &broker));
    }

    #[test]
    fn test_ak47_fires_bullets_then_moves_furthest() {
        let (gw, mut broker) = setup(true);
        let mut quoter = Quoter::new();
        let p = mode(QuotingMode::Ak47);
        let now = Utc::now();

        for px in [dec!(100), dec!(101)] {
            assert_eq!(
                quoter.update_quote(Side::Ask, quote(px), &p, &mut broker, now),
                QuoteAction::Submitted
            );
            let id = quoter.order_ids(Side::Ask).last().cloned().unwrap();
            ack(&mut broker, &id, OrderStatus::Working);
        }
        // Within range of the 101 bullet.
        assert_eq!(
            quoter.update_quote(Side::Ask, quote(dec!(101.2)), &p, &mut broker, now),
            QuoteAction::Unchanged
        );
        // Out of bullets: the one at 100 moves.
        assert_eq!(
            quoter.update_quote(Side::Ask, quote(dec!(102)), &p, &mut broker, now),
            QuoteAction::Replaced
        );
        let first = quoter.order_ids(Side::Ask)[0].clone();
        assert!(matches!(
            gw.commands().last(),
            Some(GatewayCommand::Replace { order_id, .. }) if *order_id == first
        ));
    }
}
