//! Latest balances and their valuation.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;
use tribeca_bus::{BusResult, MessageBus, Observable, Topic};
use tribeca_core::{CurrencyPair, CurrencyPosition, PositionReport, Price};

pub struct PositionBroker {
    pair: CurrencyPair,
    balances: HashMap<String, CurrencyPosition>,
    report: Observable<PositionReport>,
}

fn same_values(a: &PositionReport, b: &PositionReport) -> bool {
    a.base_amount == b.base_amount
        && a.quote_amount == b.quote_amount
        && a.base_held_amount == b.base_held_amount
        && a.quote_held_amount == b.quote_held_amount
        && a.value == b.value
        && a.quote_value == b.quote_value
}

impl PositionBroker {
    pub fn new(pair: CurrencyPair, bus: &MessageBus) -> BusResult<Self> {
        Ok(Self {
            pair,
            balances: HashMap::new(),
            report: Observable::published(bus.publisher(Topic::Position))?,
        })
    }

    /// Store a balance from the position feed and publish the new report.
    ///
    /// Every connector update is published, even when the balances did not
    /// move. Returns whether a report was produced.
    pub fn on_position(
        &mut self,
        position: CurrencyPosition,
        fair_value: Option<Price>,
        now: DateTime<Utc>,
    ) -> bool {
        if position.currency != self.pair.base && position.currency != self.pair.quote {
            debug!(currency = %position.currency, "Ignoring balance outside traded pair");
            return false;
        }
        self.balances.insert(position.currency.clone(), position);
        match self.build(fair_value, now) {
            Some(report) => self.report.set_if(report, |_, _| true),
            None => false,
        }
    }

    /// Revalue at a new fair value. Publishes only if a value changed.
    pub fn revalue(&mut self, fair_value: Option<Price>, now: DateTime<Utc>) -> bool {
        match self.build(fair_value, now) {
            Some(report) => self.report.set_if(report, |old, new| !same_values(old, new)),
            None => false,
        }
    }

    fn build(&self, fair_value: Option<Price>, now: DateTime<Utc>) -> Option<PositionReport> {
        let base = self.balances.get(&self.pair.base)?;
        let quote = self.balances.get(&self.pair.quote)?;
        PositionReport::valued(base, quote, fair_value?, self.pair.clone(), now)
    }

    pub fn currency(&self, currency: &str) -> Option<&CurrencyPosition> {
        self.balances.get(currency)
    }

    pub fn base(&self) -> Option<&CurrencyPosition> {
        self.balances.get(&self.pair.base)
    }

    pub fn quote(&self) -> Option<&CurrencyPosition> {
        self.balances.get(&self.pair.quote)
    }

    pub fn latest_report(&self) -> Option<PositionReport> {
        self.report.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_report_needs_both_currencies_and_fair_value() {
        let bus = MessageBus::new();
        let mut broker = PositionBroker::new(CurrencyPair::new("BTC", "USD"), &bus).unwrap();
        let mut sub = bus.subscribe(Topic::Position);
        let fv = Some(Price::new(dec!(100)));

        assert!(!broker.on_position(CurrencyPosition::new("BTC", dec!(1), dec!(0)), fv, Utc::now()));
        assert!(!broker.on_position(CurrencyPosition::new("ETH", dec!(5), dec!(0)), fv, Utc::now()));
        assert!(broker.on_position(CurrencyPosition::new("USD", dec!(100), dec!(0)), fv, Utc::now()));

        let report = broker.latest_report().unwrap();
        assert_eq!(report.value, dec!(2));
        assert!(sub.messages.recv().await.is_some());
        assert!(broker.currency("ETH").is_none());
    }

    #[test]
    fn test_every_connector_update_publishes() {
        let bus = MessageBus::new();
        let mut broker = PositionBroker::new(CurrencyPair::new("BTC", "USD"), &bus).unwrap();
        let fv = Some(Price::new(dec!(100)));
        broker.on_position(CurrencyPosition::new("BTC", dec!(1), dec!(0)), fv, Utc::now());
        assert!(broker.on_position(CurrencyPosition::new("USD", dec!(10), dec!(0)), fv, Utc::now()));
        assert!(broker.on_position(CurrencyPosition::new("USD", dec!(10), dec!(0)), fv, Utc::now()));
    }

    #[test]
    fn test_revalue_only_on_change() {
        let bus = MessageBus::new();
        let mut broker = PositionBroker::new(CurrencyPair::new("BTC", "USD"), &bus).unwrap();
        let fv = Some(Price::new(dec!(100)));
        broker.on_position(CurrencyPosition::new("BTC", dec!(1), dec!(0)), fv, Utc::now());
        broker.on_position(CurrencyPosition::new("USD", dec!(100), dec!(0)), fv, Utc::now());

        assert!(!broker.revalue(fv, Utc::now()));
        assert!(broker.revalue(Some(Price::new(dec!(50))), Utc::now()));
        assert!(!broker.revalue(None, Utc::now()));
        assert_eq!(broker.latest_report().unwrap().value, dec!(3));
    }
}
