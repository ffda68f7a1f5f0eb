//! One quote generator per quoting mode.
//!
//! Generators see the filtered book, fair value and parameters, and return
//! unrounded prices. Everything mode-independent (protection, position
//! steering, ping/pong constraints, safety, rounding) happens afterwards
//! in the quoting engine.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tribeca_core::{MarketLevel, MarketUpdate, Price, QuotingMode, QuotingParameters, Size};

/// Unrounded prices proposed by a style. `None` leaves a side unquoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StyleQuote {
    pub bid: Option<Price>,
    pub ask: Option<Price>,
}

pub struct StyleInput<'a> {
    pub book: &'a MarketUpdate,
    pub fair_value: Price,
    pub params: &'a QuotingParameters,
    pub tick: Price,
}

pub fn generate(mode: QuotingMode, input: &StyleInput<'_>) -> StyleQuote {
    match mode {
        QuotingMode::Mid | QuotingMode::Boomerang => mid(input),
        QuotingMode::Top | QuotingMode::PingPong | QuotingMode::Ak47 => top_join(input, true),
        QuotingMode::Join => top_join(input, false),
        QuotingMode::InverseJoin => inverse(input, false),
        QuotingMode::InverseTop => inverse(input, true),
        QuotingMode::Depth => depth(input),
    }
}

fn half_width(input: &StyleInput<'_>) -> Price {
    input.params.width / dec!(2)
}

/// Symmetric around fair value.
fn mid(input: &StyleInput<'_>) -> StyleQuote {
    let half = half_width(input);
    StyleQuote {
        bid: Some(input.fair_value - half),
        ask: Some(input.fair_value + half),
    }
}

/// First level with more than `step_over` size, or the next one.
fn top_level(levels: &[MarketLevel], step_over: Size) -> Option<&MarketLevel> {
    levels
        .iter()
        .find(|l| l.size > step_over)
        .or_else(|| levels.get(1))
        .or_else(|| levels.first())
}

/// Join (or penny) the best meaningful level, never closer to fair value
/// than half the width.
fn top_join(input: &StyleInput<'_>, penny: bool) -> StyleQuote {
    let step_over = input.params.step_over_size;
    let half = half_width(input);
    let tick = if penny { input.tick } else { Price::ZERO };

    let bid = top_level(&input.book.bids, step_over)
        .map(|l| (l.price + tick).min(input.fair_value - half));
    let ask = top_level(&input.book.asks, step_over)
        .map(|l| (l.price - tick).max(input.fair_value + half));
    StyleQuote { bid, ask }
}

/// Quote away from the market: widen by `width` when the market is wider
/// than `width`, and shift out by `width / 4` when it is narrower than
/// two thirds of it.
fn inverse(input: &StyleInput<'_>, penny: bool) -> StyleQuote {
    let step_over = input.params.step_over_size;
    let width = input.params.width;
    let (Some(top_bid), Some(top_ask)) = (
        top_level(&input.book.bids, step_over),
        top_level(&input.book.asks, step_over),
    ) else {
        return StyleQuote::default();
    };
    let mut bid = top_bid.price;
    let mut ask = top_ask.price;
    let market_width = Price::new((ask.inner() - bid.inner()).abs());

    if market_width > width {
        bid = bid - width;
        ask = ask + width;
    }
    if penny {
        bid = bid + input.tick;
        ask = ask - input.tick;
    }
    if market_width.inner() < width.inner() * dec!(2) / dec!(3) {
        let quarter = width / dec!(4);
        bid = bid - quarter;
        ask = ask + quarter;
    }
    StyleQuote {
        bid: Some(bid),
        ask: Some(ask),
    }
}

/// Price of the first level at which cumulative size reaches `width`
/// (read as a size), or the deepest level if it never does.
fn depth_price(levels: &[MarketLevel], depth: Decimal) -> Option<Price> {
    let mut cumulative = Decimal::ZERO;
    for level in levels {
        cumulative += level.size.inner();
        if cumulative >= depth {
            return Some(level.price);
        }
    }
    levels.last().map(|l| l.price)
}

fn depth(input: &StyleInput<'_>) -> StyleQuote {
    let depth = input.params.width.inner();
    StyleQuote {
        bid: depth_price(&input.book.bids, depth),
        ask: depth_price(&input.book.asks, depth),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn lvl(px: Decimal, sz: Decimal) -> MarketLevel {
        MarketLevel::new(Price::new(px), Size::new(sz))
    }

    fn book() -> MarketUpdate {
        MarketUpdate::new(
            Utc::now(),
            vec![lvl(dec!(99.5), dec!(0.05)), lvl(dec!(99), dec!(1)), lvl(dec!(98), dec!(2))],
            vec![lvl(dec!(100.5), dec!(1)), lvl(dec!(101), dec!(1)), lvl(dec!(102), dec!(2))],
        )
    }

    fn run(mode: QuotingMode, width: Decimal, fv: Decimal) -> StyleQuote {
        let params = QuotingParameters {
            width: Price::new(width),
            step_over_size: Size::new(dec!(0.1)),
            ..Default::default()
        };
        let book = book();
        generate(
            mode,
            &StyleInput {
                book: &book,
                fair_value: Price::new(fv),
                params: &params,
                tick: Price::new(dec!(0.01)),
            },
        )
    }

    #[test]
    fn test_mid_is_symmetric() {
        let q = run(QuotingMode::Mid, dec!(2), dec!(100));
        assert_eq!(q.bid, Some(Price::new(dec!(99))));
        assert_eq!(q.ask, Some(Price::new(dec!(101))));
    }

    #[test]
    fn test_join_steps_over_small_level() {
        let q = run(QuotingMode::Join, dec!(0.5), dec!(100));
        // 99.5 bid is too small; joins 99. Ask joins 100.5.
        assert_eq!(q.bid, Some(Price::new(dec!(99))));
        assert_eq!(q.ask, Some(Price::new(dec!(100.5))));
    }

    #[test]
    fn test_top_pennies_within_width() {
        let q = run(QuotingMode::Top, dec!(0.5), dec!(100));
        assert_eq!(q.bid, Some(Price::new(dec!(99.01))));
        assert_eq!(q.ask, Some(Price::new(dec!(100.49))));
    }

    #[test]
    fn test_top_bounded_by_width() {
        let q = run(QuotingMode::Top, dec!(4), dec!(100));
        assert_eq!(q.bid, Some(Price::new(dec!(98))));
        assert_eq!(q.ask, Some(Price::new(dec!(102))));
    }

    #[test]
    fn test_inverse_widens_wide_market() {
        // Market 99..100.5 is 1.5 wide, wider than width 1.
        let q = run(QuotingMode::InverseJoin, dec!(1), dec!(100));
        assert_eq!(q.bid, Some(Price::new(dec!(98))));
        assert_eq!(q.ask, Some(Price::new(dec!(101.5))));
    }

    #[test]
    fn test_inverse_shifts_narrow_market() {
        // 1.5 wide market, width 3: not wider, but narrower than 2.
        let q = run(QuotingMode::InverseJoin, dec!(3), dec!(100));
        assert_eq!(q.bid, Some(Price::new(dec!(98.25))));
        assert_eq!(q.ask, Some(Price::new(dec!(101.25))));
    }

    #[test]
    fn test_depth_accumulates_size() {
        let q = run(QuotingMode::Depth, dec!(1), dec!(100));
        assert_eq!(q.bid, Some(Price::new(dec!(99))));
        assert_eq!(q.ask, Some(Price::new(dec!(100.5))));
        let deep = run(QuotingMode::Depth, dec!(100), dec!(100));
        assert_eq!(deep.bid, Some(Price::new(dec!(98))));
        assert_eq!(deep.ask, Some(Price::new(dec!(102))));
    }
}
