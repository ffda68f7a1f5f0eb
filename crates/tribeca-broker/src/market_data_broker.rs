//! Latest raw book from the market-data feed.

use tribeca_bus::{BatchPolicy, BusResult, MessageBus, Observable, Topic};
use tribeca_core::MarketUpdate;

pub struct MarketDataBroker {
    latest: Observable<MarketUpdate>,
}

impl MarketDataBroker {
    /// Books go out through `batch`, the busiest operator topic.
    pub fn new(bus: &MessageBus, batch: &BatchPolicy) -> BusResult<Self> {
        Ok(Self {
            latest: Observable::published(bus.publisher(Topic::MarketData).batched(batch))?,
        })
    }

    /// Store and publish a book. Returns `false` for a repeat of the latest one.
    pub fn on_market_data(&mut self, update: MarketUpdate) -> bool {
        self.latest.set(update)
    }

    pub fn latest(&self) -> Option<MarketUpdate> {
        self.latest.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tribeca_core::{MarketLevel, Price, Size};

    #[test]
    fn test_duplicate_book_not_republished() {
        let bus = MessageBus::new();
        let mut broker = MarketDataBroker::new(&bus, &bus.batch_policy(None)).unwrap();
        let book = MarketUpdate::new(
            Utc::now(),
            vec![MarketLevel::new(Price::new(dec!(99)), Size::new(dec!(1)))],
            vec![MarketLevel::new(Price::new(dec!(101)), Size::new(dec!(1)))],
        );

        assert!(broker.on_market_data(book.clone()));
        assert!(!broker.on_market_data(book.clone()));
        assert_eq!(broker.latest(), Some(book));

        let sub = bus.subscribe(Topic::MarketData);
        assert_eq!(sub.snapshot.len(), 1);
    }
}
