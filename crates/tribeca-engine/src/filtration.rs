//! Removes our own resting orders from the book before pricing sees it.

use tracing::debug;
use tribeca_core::{MarketLevel, MarketUpdate, Order, Side};

/// Subtract the leaves quantity of `own` orders from the level at the same
/// price, dropping levels that reach zero.
///
/// Returns `None` when what remains is crossed; such a book never reaches
/// fair-value computation.
pub fn filter_book(raw: &MarketUpdate, own: &[Order]) -> Option<MarketUpdate> {
    let bids = filter_side(&raw.bids, own, Side::Bid);
    let asks = filter_side(&raw.asks, own, Side::Ask);
    let filtered = MarketUpdate::new(raw.time, bids, asks);
    if filtered.is_crossed() {
        debug!(
            bid = ?filtered.best_bid().map(|l| l.price),
            ask = ?filtered.best_ask().map(|l| l.price),
            "Dropping crossed book"
        );
        return None;
    }
    Some(filtered)
}

fn filter_side(levels: &[MarketLevel], own: &[Order], side: Side) -> Vec<MarketLevel> {
    levels
        .iter()
        .filter_map(|level| {
            let mine = own
                .iter()
                .filter(|o| o.side == side && o.status.is_live() && o.price == level.price)
                .fold(level.size, |size, o| size - o.leaves_quantity);
            mine.is_positive().then(|| MarketLevel::new(level.price, mine))
        })
        .collect()
}

/// Latest filtered book.
#[derive(Debug, Default)]
pub struct MarketFiltration {
    latest: Option<MarketUpdate>,
}

impl MarketFiltration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter `raw` against `own`. A crossed result clears the latest book.
    pub fn on_market_data(&mut self, raw: &MarketUpdate, own: &[Order]) -> Option<&MarketUpdate> {
        self.latest = filter_book(raw, own);
        self.latest.as_ref()
    }

    pub fn latest(&self) -> Option<&MarketUpdate> {
        self.latest.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tribeca_core::{
        CurrencyPair, OrderId, OrderStatus, OrderType, Price, Size, TimeInForce,
    };

    fn level(px: Decimal, sz: Decimal) -> MarketLevel {
        MarketLevel::new(Price::new(px), Size::new(sz))
    }

    fn book(bids: Vec<MarketLevel>, asks: Vec<MarketLevel>) -> MarketUpdate {
        MarketUpdate::new(Utc::now(), bids, asks)
    }

    fn own(side: Side, px: Decimal, leaves: Decimal, status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            order_id: OrderId::generate(),
            exchange_id: None,
            exchange: "Null".into(),
            pair: CurrencyPair::new("BTC", "USD"),
            side,
            price: Price::new(px),
            quantity: Size::new(leaves),
            leaves_quantity: Size::new(leaves),
            filled_quantity: Size::ZERO,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::GoodTilCancelled,
            status,
            created_at: now,
            updated_at: now,
            latency_ms: None,
            pending_cancel: false,
            pending_replace: false,
            reject_reason: None,
        }
    }

    #[test]
    fn test_own_size_is_subtracted() {
        let raw = book(
            vec![level(dec!(99), dec!(3)), level(dec!(98), dec!(1))],
            vec![level(dec!(101), dec!(2))],
        );
        let mine = [own(Side::Bid, dec!(99), dec!(1), OrderStatus::Working)];
        let filtered = filter_book(&raw, &mine).unwrap();
        assert_eq!(filtered.bids[0], level(dec!(99), dec!(2)));
        assert_eq!(filtered.asks, raw.asks);
    }

    #[test]
    fn test_level_of_only_own_size_is_removed() {
        let raw = book(
            vec![level(dec!(99.5), dec!(1)), level(dec!(99), dec!(2))],
            vec![level(dec!(101), dec!(2))],
        );
        let mine = [own(Side::Bid, dec!(99.5), dec!(1), OrderStatus::Working)];
        let filtered = filter_book(&raw, &mine).unwrap();
        assert_eq!(filtered.bids, vec![level(dec!(99), dec!(2))]);
    }

    #[test]
    fn test_terminal_and_other_side_orders_ignored() {
        let raw = book(vec![level(dec!(99), dec!(3))], vec![level(dec!(101), dec!(2))]);
        let mine = [
            own(Side::Bid, dec!(99), dec!(1), OrderStatus::Cancelled),
            own(Side::Ask, dec!(99), dec!(1), OrderStatus::Working),
        ];
        let filtered = filter_book(&raw, &mine).unwrap();
        assert_eq!(filtered.bids[0].size, Size::new(dec!(3)));
    }

    #[test]
    fn test_crossed_book_is_rejected() {
        let raw = book(vec![level(dec!(101), dec!(1))], vec![level(dec!(100), dec!(1))]);
        assert!(filter_book(&raw, &[]).is_none());

        let mut filtration = MarketFiltration::new();
        assert!(filtration.on_market_data(&raw, &[]).is_none());
        assert!(filtration.latest().is_none());
    }

    #[test]
    fn test_filtered_books_are_never_crossed() {
        let raw = book(
            vec![level(dec!(100), dec!(1)), level(dec!(99), dec!(1))],
            vec![level(dec!(100), dec!(1)), level(dec!(101), dec!(1))],
        );
        // Removing our own bid at 100 uncrosses the book.
        let mine = [own(Side::Bid, dec!(100), dec!(1), OrderStatus::Working)];
        let filtered = filter_book(&raw, &mine).unwrap();
        assert!(filtered.best_bid().unwrap().price < filtered.best_ask().unwrap().price);
    }
}
