//! Rolling trade-frequency estimate.
//!
//! Counts order-sized fills per minute inside the configured window.
//! Buys and sells that close each other at a profit (sell price at or
//! above buy price) are netted out first, so a healthy ping/pong cycle
//! does not count against safety.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;
use tribeca_bus::{BusResult, MessageBus, Observable, Topic};
use tribeca_core::{PongAt, Price, QuotingParameters, Side, Size, Trade, TradeSafety};
use tribeca_telemetry::Metrics;

use crate::statistics::to_f64;

/// Fills left below this after netting are treated as fully netted.
const DUST: Decimal = dec!(0.0001);

#[derive(Debug, Clone, Copy)]
struct Fill {
    price: Price,
    quantity: Decimal,
}

/// Size-weighted price of the open pings that the next pong would close.
///
/// Pings are taken in `pong_at` order (nearest first for the short
/// selectors, where nearest means highest for buys and lowest for sells)
/// until `size` is covered.
pub fn weighted_ping_price(
    pings: &[(Price, Size)],
    side: Side,
    pong_at: PongAt,
    size: Size,
) -> Option<Price> {
    let mut ordered: Vec<(Price, Size)> = pings.to_vec();
    ordered.sort_by_key(|(px, _)| *px);
    let nearest_last = matches!(side, Side::Bid);
    if pong_at.is_short() == nearest_last {
        ordered.reverse();
    }

    let mut remaining = size.inner();
    let mut qty = Decimal::ZERO;
    let mut notional = Decimal::ZERO;
    for (px, sz) in ordered {
        if remaining <= Decimal::ZERO {
            break;
        }
        let take = sz.inner().min(remaining);
        qty += take;
        notional += take * px.inner();
        remaining -= take;
    }
    if qty.is_zero() {
        return None;
    }
    Some(Price::new(notional / qty))
}

/// Compute trade safety over `trades`.
pub fn compute_safety(
    trades: &[Trade],
    buy_pings: &[(Price, Size)],
    sell_pings: &[(Price, Size)],
    params: &QuotingParameters,
    now: DateTime<Utc>,
) -> TradeSafety {
    let window_secs = params.trade_rate_seconds.max(1);
    let since = now - Duration::seconds(window_secs as i64);
    let in_window = |side: Side| -> Vec<Fill> {
        trades
            .iter()
            .filter(|t| t.side == side && t.time > since)
            .map(|t| Fill {
                price: t.price,
                quantity: t.quantity.inner(),
            })
            .collect()
    };

    // Buys high to low, sells low to high: the cheapest buy and the
    // dearest sell sit at the back and are netted first.
    let mut buys = in_window(Side::Bid);
    buys.sort_by(|a, b| b.price.cmp(&a.price));
    let mut sells = in_window(Side::Ask);
    sells.sort_by(|a, b| a.price.cmp(&b.price));

    while let (Some(buy), Some(sell)) = (buys.last().copied(), sells.last().copied()) {
        if sell.price < buy.price {
            break;
        }
        let netted = buy.quantity.min(sell.quantity);
        let buy_left = buy.quantity - netted;
        let sell_left = sell.quantity - netted;
        if buy_left < DUST {
            buys.pop();
        } else if let Some(last) = buys.last_mut() {
            last.quantity = buy_left;
        }
        if sell_left < DUST {
            sells.pop();
        } else if let Some(last) = sells.last_mut() {
            last.quantity = sell_left;
        }
    }

    let minutes = Decimal::from(window_secs) / dec!(60);
    let per_minute = |fills: &[Fill], size: Decimal| -> Decimal {
        if size.is_zero() {
            return Decimal::ZERO;
        }
        let total: Decimal = fills.iter().map(|f| f.quantity).sum();
        total / size / minutes
    };

    let buy_size = params.buy_size.inner();
    let sell_size = params.sell_size.inner();
    let mut all = buys.clone();
    all.extend_from_slice(&sells);

    TradeSafety {
        buy: per_minute(&buys, buy_size),
        sell: per_minute(&sells, sell_size),
        combined: per_minute(&all, (buy_size + sell_size) / dec!(2)),
        buy_ping: weighted_ping_price(buy_pings, Side::Bid, params.pong_at, params.sell_size),
        sell_pong: weighted_ping_price(sell_pings, Side::Ask, params.pong_at, params.buy_size),
        time: now,
    }
}

pub struct SafetyCalculator {
    latest: Observable<TradeSafety>,
}

impl SafetyCalculator {
    pub fn new(bus: &MessageBus) -> BusResult<Self> {
        Ok(Self {
            latest: Observable::published(bus.publisher(Topic::TradeSafetyValue))?,
        })
    }

    pub fn latest(&self) -> Option<TradeSafety> {
        self.latest.get()
    }

    /// Recompute and publish when any value moved.
    pub fn recompute(
        &mut self,
        trades: &[Trade],
        buy_pings: &[(Price, Size)],
        sell_pings: &[(Price, Size)],
        params: &QuotingParameters,
        now: DateTime<Utc>,
    ) -> bool {
        let safety = compute_safety(trades, buy_pings, sell_pings, params, now);
        let changed = self.latest.set_if(safety, |old, new| !old.same_values(new));
        if changed {
            debug!(
                buy = %safety.buy,
                sell = %safety.sell,
                combined = %safety.combined,
                "Trade safety"
            );
            Metrics::trade_safety(
                to_f64(safety.buy),
                to_f64(safety.sell),
                to_f64(safety.combined),
            );
        }
        changed
    }
}
