//! Decision core: the desired two-sided quote.
//!
//! `compute_quote` is a pure function of the current state. It runs the
//! mode's style generator and then applies, in order:
//!
//! 1. EWMA protection
//! 2. target-position steering and aggressive rebalancing
//! 3. pong constraints and ping gating (ping/pong modes)
//! 4. trade-safety limits
//! 5. tick and lot rounding
//!
//! A result with bid at or above ask is dropped with a warning.

use rust_decimal::Decimal;
use tracing::{debug, warn};
use tribeca_core::{
    AprMode, MarketUpdate, PingAt, PositionReport, Price, Quote, QuotingParameters, Side, Size,
    TradeSafety, TwoSidedQuote,
};

use crate::position_management::position_divergence;
use crate::quoting_styles::{generate, StyleInput};
use crate::statistics::EwmaSnapshot;

/// Everything the quote depends on.
#[derive(Debug, Clone, Copy)]
pub struct QuoteInputs<'a> {
    pub book: Option<&'a MarketUpdate>,
    pub fair_value: Option<Price>,
    pub params: &'a QuotingParameters,
    pub ewma: &'a EwmaSnapshot,
    pub target_base_position: Option<Decimal>,
    pub position: Option<&'a PositionReport>,
    pub safety: Option<&'a TradeSafety>,
    pub tick: Price,
    pub min_size: Size,
    pub active: bool,
}

/// Desired quote, or `None` when nothing should be quoted at all.
pub fn compute_quote(inputs: &QuoteInputs<'_>) -> Option<TwoSidedQuote> {
    if !inputs.active {
        return None;
    }
    let fair_value = inputs.fair_value?;
    let book = inputs.book?;
    let params = inputs.params;

    let style = generate(
        params.mode,
        &StyleInput {
            book,
            fair_value,
            params,
            tick: inputs.tick,
        },
    );
    let mut quote = TwoSidedQuote::new(
        style.bid.map(|px| Quote::new(px, params.buy_size)),
        style.ask.map(|px| Quote::new(px, params.sell_size)),
    );

    apply_ewma_protection(&mut quote, inputs);
    apply_position_steering(&mut quote, fair_value, inputs);
    if params.mode.is_ping_pong() {
        apply_pong_constraints(&mut quote, inputs);
        apply_ping_gating(&mut quote, fair_value, inputs);
    }
    apply_safety(&mut quote, inputs);
    round(&mut quote, inputs.tick, inputs.min_size);

    if quote.is_self_crossed() {
        warn!(
            bid = ?quote.bid.map(|q| q.price),
            ask = ?quote.ask.map(|q| q.price),
            mode = %params.mode,
            "Suppressing self-crossed quote"
        );
        return None;
    }
    Some(quote)
}

fn apply_ewma_protection(quote: &mut TwoSidedQuote, inputs: &QuoteInputs<'_>) {
    if !inputs.params.ewma_protection {
        return;
    }
    let Some(ewma) = inputs.ewma.quoting.map(Price::new) else {
        return;
    };
    if let Some(bid) = quote.bid.as_mut() {
        bid.price = bid.price.min(ewma);
    }
    if let Some(ask) = quote.ask.as_mut() {
        ask.price = ask.price.max(ewma);
    }
}

fn apply_position_steering(quote: &mut TwoSidedQuote, fair_value: Price, inputs: &QuoteInputs<'_>) {
    let (Some(target), Some(position)) = (inputs.target_base_position, inputs.position) else {
        return;
    };
    let params = inputs.params;
    let current = position.total_base();
    let Some(rebalance) = position_divergence(target, current, params.position_divergence) else {
        return;
    };
    let (keep, opposite) = match rebalance {
        Side::Bid => (&mut quote.bid, &mut quote.ask),
        Side::Ask => (&mut quote.ask, &mut quote.bid),
    };
    *opposite = None;

    let safety_exceeded = inputs
        .safety
        .is_some_and(|s| s.combined > params.trades_per_minute);
    if params.apr == AprMode::Off || safety_exceeded {
        return;
    }
    let Some(q) = keep.as_mut() else {
        return;
    };
    let missing = (target - current).abs();
    let grown = (params.size_for(rebalance).inner() * params.apr_multiplier).min(missing);
    q.size = Size::new(grown);
    if params.apr == AprMode::SizeWidth && params.apr_multiplier > Decimal::ONE {
        let distance = (fair_value.inner() - q.price.inner()).abs() / params.apr_multiplier;
        q.price = match rebalance {
            Side::Bid => Price::new(fair_value.inner() - distance),
            Side::Ask => Price::new(fair_value.inner() + distance),
        };
    }
    debug!(side = %rebalance, size = %q.size, price = %q.price, "Aggressive rebalancing");
}

/// Hold pongs at a profit of `width` over the pings they close.
fn apply_pong_constraints(quote: &mut TwoSidedQuote, inputs: &QuoteInputs<'_>) {
    let Some(safety) = inputs.safety else {
        return;
    };
    let width = inputs.params.width;
    let aggressive = inputs.params.pong_at.is_aggressive();
    if let (Some(ask), Some(ping)) = (quote.ask.as_mut(), safety.buy_ping) {
        let target = ping + width;
        ask.price = if aggressive { target } else { ask.price.max(target) };
    }
    if let (Some(bid), Some(ping)) = (quote.bid.as_mut(), safety.sell_pong) {
        let target = ping - width;
        bid.price = if aggressive { target } else { bid.price.min(target) };
    }
}

/// Drop sides that would open a new ping where `ping_at` forbids it.
/// A side that closes an open ping is always kept.
fn apply_ping_gating(quote: &mut TwoSidedQuote, fair_value: Price, inputs: &QuoteInputs<'_>) {
    let params = inputs.params;
    let (ask_is_pong, bid_is_pong) = match inputs.safety {
        Some(s) => (s.buy_ping.is_some(), s.sell_pong.is_some()),
        None => (false, false),
    };
    // Bid side depleted: not enough quote currency for another buy.
    // Ask side depleted: not enough base currency for another sell.
    let (bid_depleted, ask_depleted) = match inputs.position {
        Some(p) => (
            p.quote_amount + p.quote_held_amount <= params.buy_size.notional(fair_value),
            p.total_base() <= params.sell_size.inner(),
        ),
        None => (false, false),
    };
    let (bid_may_ping, ask_may_ping) = match params.ping_at {
        PingAt::BothSides => (true, true),
        PingAt::BidSide => (true, false),
        PingAt::AskSide => (false, true),
        PingAt::StopPings => (false, false),
        PingAt::DepletedSide => (ask_depleted, bid_depleted),
        PingAt::DepletedBidSide => (false, bid_depleted),
        PingAt::DepletedAskSide => (ask_depleted, false),
    };
    if !bid_is_pong && !bid_may_ping {
        quote.bid = None;
    }
    if !ask_is_pong && !ask_may_ping {
        quote.ask = None;
    }
}

fn apply_safety(quote: &mut TwoSidedQuote, inputs: &QuoteInputs<'_>) {
    let Some(safety) = inputs.safety else {
        return;
    };
    let limit = inputs.params.trades_per_minute;
    if safety.buy > limit && quote.bid.take().is_some() {
        debug!(buy = %safety.buy, limit = %limit, "Bid held by trade safety");
    }
    if safety.sell > limit && quote.ask.take().is_some() {
        debug!(sell = %safety.sell, limit = %limit, "Ask held by trade safety");
    }
}

fn round(quote: &mut TwoSidedQuote, tick: Price, lot: Size) {
    quote.bid = quote.bid.and_then(|q| {
        let price = q.price.round_down(tick);
        price
            .is_positive()
            .then(|| Quote::new(price, q.size.round_to_lot(lot)))
    });
    quote.ask = quote.ask.and_then(|q| {
        let price = q.price.round_up(tick);
        price
            .is_positive()
            .then(|| Quote::new(price, q.size.round_to_lot(lot)))
    });
}

/// Latest computed quote with change detection.
#[derive(Debug, Default)]
pub struct QuotingEngine {
    latest: Option<TwoSidedQuote>,
    computed: bool,
}

impl QuotingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<TwoSidedQuote> {
        self.latest
    }

    /// Recompute. Returns `true` when the quote differs from the previous one.
    pub fn recompute(&mut self, inputs: &QuoteInputs<'_>) -> bool {
        let next = compute_quote(inputs);
        let changed = !self.computed || next != self.latest;
        if changed {
            debug!(
                bid = ?next.and_then(|q| q.bid).map(|q| q.price),
                ask = ?next.and_then(|q| q.ask).map(|q| q.price),
                "New quote"
            );
        }
        self.latest = next;
        self.computed = true;
        changed
    }
}
