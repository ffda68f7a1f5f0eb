//! Risk gate between the quoting engine and the quoter.
//!
//! Each side is checked on its own; a side that fails any check is held
//! (its resting orders are pulled) while the other side may stay live.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};
use tribeca_broker::OrderBroker;
use tribeca_bus::{BusResult, MessageBus, Observable, Topic};
use tribeca_core::{
    PositionReport, Quote, QuoteStatus, QuotingMode, QuotingParameters, Side,
    TwoSidedQuote, TwoSidedQuoteStatus,
};
use tribeca_telemetry::Metrics;

use crate::quoter::Quoter;

/// State the gate needs besides the proposed quote.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    pub params: &'a QuotingParameters,
    pub position: Option<&'a PositionReport>,
    pub active: bool,
}

pub struct QuoteSender {
    quoter: Quoter,
    status: Observable<TwoSidedQuoteStatus>,
    /// Free balance that must remain after placing a quote, in the
    /// currency the side spends.
    min_balance_margin: Decimal,
}

impl QuoteSender {
    pub fn new(bus: &MessageBus, min_balance_margin: Decimal) -> BusResult<Self> {
        Ok(Self {
            quoter: Quoter::new(),
            status: Observable::published_with(
                bus.publisher(Topic::QuoteStatus),
                TwoSidedQuoteStatus::default(),
            )?,
            min_balance_margin,
        })
    }

    pub fn status(&self) -> TwoSidedQuoteStatus {
        self.status.get().unwrap_or_default()
    }

    pub fn quoter(&self) -> &Quoter {
        &self.quoter
    }

    /// Gate `quote` side by side and hand the result to the quoter.
    pub fn send(
        &mut self,
        quote: Option<&TwoSidedQuote>,
        ctx: &GateContext<'_>,
        broker: &mut OrderBroker,
        now: DateTime<Utc>,
    ) -> TwoSidedQuoteStatus {
        let live_orders = broker.live_orders();
        let self_trade_prevention = broker.details().has_self_trade_prevention;

        let mut statuses = [QuoteStatus::Held; 2];
        for (slot, side) in [Side::Bid, Side::Ask].into_iter().enumerate() {
            let status = match quote {
                Some(proposed) => match proposed.side(side) {
                    Some(q) => {
                        let resting = live_orders.iter().any(|o| o.side == side);
                        if self.allows(side, q, proposed, ctx, resting, self_trade_prevention) {
                            self.quoter.update_quote(side, q, ctx.params, broker, now);
                            QuoteStatus::Live
                        } else {
                            QuoteStatus::Held
                        }
                    }
                    None => QuoteStatus::Held,
                },
                None => QuoteStatus::Held,
            };
            if status == QuoteStatus::Held {
                self.quoter.cancel_quote(side, broker, now);
            }
            statuses[slot] = status;
        }

        let next = TwoSidedQuoteStatus::new(statuses[0], statuses[1]);
        if self.status.set(next) {
            debug!(bid = %next.bid_status, ask = %next.ask_status, "Quote status changed");
            Metrics::quote_status("bid", next.bid_status == QuoteStatus::Live);
            Metrics::quote_status("ask", next.ask_status == QuoteStatus::Live);
        }
        next
    }

    fn allows(
        &self,
        side: Side,
        quote: Quote,
        proposed: &TwoSidedQuote,
        ctx: &GateContext<'_>,
        resting: bool,
        self_trade_prevention: bool,
    ) -> bool {
        if !ctx.active {
            return false;
        }
        if !self.has_balance(side, quote, ctx, resting) {
            debug!(side = %side, size = %quote.size, "Insufficient free balance, holding side");
            return false;
        }
        if !self_trade_prevention && crosses_opposite(side, quote, proposed) {
            warn!(
                side = %side,
                price = %quote.price,
                "Quote would cross the opposite quote, holding side"
            );
            Metrics::crossed_quote();
            return false;
        }
        true
    }

    /// Only free balance counts; funds held by resting orders do not.
    /// AK47 keeps re-firing while a bullet already rests on the side.
    fn has_balance(&self, side: Side, quote: Quote, ctx: &GateContext<'_>, resting: bool) -> bool {
        let Some(position) = ctx.position else {
            return false;
        };
        if ctx.params.mode == QuotingMode::Ak47 && resting {
            return true;
        }
        let (free, required) = match side {
            Side::Bid => (position.quote_amount, quote.size.notional(quote.price)),
            Side::Ask => (position.base_amount, quote.size.inner()),
        };
        free >= required + self.min_balance_margin
    }
}

/// Whether `quote` reaches the proposed price of the other side.
fn crosses_opposite(side: Side, quote: Quote, proposed: &TwoSidedQuote) -> bool {
    match proposed.side(side.opposite()) {
        Some(other) => match side {
            Side::Bid => quote.price >= other.price,
            Side::Ask => quote.price <= other.price,
        },
        None => false,
    }
}
