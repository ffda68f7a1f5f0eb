//! Fair value from the filtered book.

use tracing::debug;
use tribeca_bus::{BusResult, MessageBus, Observable, Topic};
use tribeca_core::{FairValue, FairValueModel, MarketUpdate, Price};
use tribeca_telemetry::Metrics;

use crate::statistics::to_f64;

/// Reference price of `book` under `model`, rounded to the nearest tick.
///
/// `None` when either side of the book is empty.
pub fn compute_fair_value(book: &MarketUpdate, model: FairValueModel, tick: Price) -> Option<Price> {
    let bid = book.best_bid()?;
    let ask = book.best_ask()?;
    let raw = match model {
        FairValueModel::Bbo => Price::midpoint(bid.price, ask.price),
        FairValueModel::WeightedBbo => {
            let total = bid.size.inner() + ask.size.inner();
            if total.is_zero() {
                Price::midpoint(bid.price, ask.price)
            } else {
                // Leans toward the side with less size behind it.
                Price::new(
                    (bid.price.inner() * ask.size.inner() + ask.price.inner() * bid.size.inner())
                        / total,
                )
            }
        }
    };
    let rounded = raw.round_nearest(tick);
    rounded.is_positive().then_some(rounded)
}

pub struct FairValueEngine {
    latest: Observable<FairValue>,
    tick: Price,
}

impl FairValueEngine {
    pub fn new(bus: &MessageBus, tick: Price) -> BusResult<Self> {
        Ok(Self {
            latest: Observable::published(bus.publisher(Topic::FairValue))?,
            tick,
        })
    }

    /// Recompute from the latest filtered book.
    ///
    /// Without a book or with a one-sided book the fair value is cleared
    /// and nothing is published. Returns whether a new value was published.
    pub fn recompute(&mut self, book: Option<&MarketUpdate>, model: FairValueModel) -> bool {
        let next = book.and_then(|b| {
            compute_fair_value(b, model, self.tick).map(|px| FairValue::new(b.time, px))
        });
        match next {
            Some(fv) => {
                let changed = self.latest.set(fv);
                if changed {
                    debug!(fair_value = %fv.price, "Fair value");
                    Metrics::fair_value(to_f64(fv.price.inner()));
                }
                changed
            }
            None => {
                if self.latest.clear() {
                    debug!("Fair value unavailable");
                }
                false
            }
        }
    }

    pub fn latest(&self) -> Option<FairValue> {
        self.latest.get()
    }

    pub fn latest_price(&self) -> Option<Price> {
        self.latest.get().map(|fv| fv.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tribeca_core::{MarketLevel, Size};

    fn tick() -> Price {
        Price::new(dec!(0.01))
    }

    fn book(bid: Option<(Decimal, Decimal)>, ask: Option<(Decimal, Decimal)>) -> MarketUpdate {
        let level = |(px, sz): (Decimal, Decimal)| MarketLevel::new(Price::new(px), Size::new(sz));
        MarketUpdate::new(
            Utc::now(),
            bid.map(level).into_iter().collect(),
            ask.map(level).into_iter().collect(),
        )
    }

    #[test]
    fn test_bbo_midpoint() {
        let b = book(Some((dec!(99), dec!(1))), Some((dec!(101), dec!(5))));
        assert_eq!(
            compute_fair_value(&b, FairValueModel::Bbo, tick()),
            Some(Price::new(dec!(100)))
        );
    }

    #[test]
    fn test_weighted_bbo_leans_to_thin_side() {
        let b = book(Some((dec!(99), dec!(1))), Some((dec!(101), dec!(3))));
        // (99*3 + 101*1) / 4 = 99.5
        assert_eq!(
            compute_fair_value(&b, FairValueModel::WeightedBbo, tick()),
            Some(Price::new(dec!(99.5)))
        );
    }

    #[test]
    fn test_rounds_to_tick() {
        let b = book(Some((dec!(99.99), dec!(1))), Some((dec!(100.02), dec!(1))));
        assert_eq!(
            compute_fair_value(&b, FairValueModel::Bbo, tick()),
            Some(Price::new(dec!(100.01)))
        );
    }

    #[test]
    fn test_empty_side_has_no_fair_value() {
        let b = book(Some((dec!(99), dec!(1))), None);
        assert_eq!(compute_fair_value(&b, FairValueModel::Bbo, tick()), None);
    }

    #[tokio::test]
    async fn test_identical_books_publish_once() {
        let bus = MessageBus::new();
        let mut engine = FairValueEngine::new(&bus, tick()).unwrap();
        let mut sub = bus.subscribe(Topic::FairValue);

        let b = book(Some((dec!(99), dec!(1))), Some((dec!(101), dec!(1))));
        assert!(engine.recompute(Some(&b), FairValueModel::Bbo));
        assert!(!engine.recompute(Some(&b), FairValueModel::Bbo));

        assert!(sub.messages.try_recv().is_ok());
        assert!(sub.messages.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_one_sided_book_clears_without_publishing() {
        let bus = MessageBus::new();
        let mut engine = FairValueEngine::new(&bus, tick()).unwrap();
        let b = book(Some((dec!(99), dec!(1))), Some((dec!(101), dec!(1))));
        engine.recompute(Some(&b), FairValueModel::Bbo);

        let mut sub = bus.subscribe(Topic::FairValue);
        let one_sided = book(Some((dec!(99), dec!(1))), None);
        assert!(!engine.recompute(Some(&one_sided), FairValueModel::Bbo));
        assert!(engine.latest().is_none());
        assert!(sub.messages.try_recv().is_err());
    }
}
