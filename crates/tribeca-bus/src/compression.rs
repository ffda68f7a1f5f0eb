//! Wire encoding of published messages.
//!
//! Most messages go out as their plain JSON form. Book depth, order status
//! and position reports are sent as fixed-shape numeric tuples instead,
//! since they dominate operator traffic. Every encoder is a pure function
//! of its input.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use tribeca_core::{
    ApplicationState, ConnectivityStatus, FairValue, MarketLevel, MarketTrade, MarketUpdate,
    OrderStatusReport, OrderType, PositionReport, ProductAdvertisement, QuotingParameters, Side,
    TargetBasePosition, TimeInForce, Trade, TradeSafety, TwoSidedQuoteStatus,
};

/// Conversion of a message into its outgoing wire form.
pub trait WireEncode: Serialize {
    fn encode(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn num(d: Decimal, dp: u32) -> Value {
    d.round_dp(dp).to_f64().map_or(Value::Null, |f| json!(f))
}

fn side_code(side: Side) -> u8 {
    match side {
        Side::Bid => 0,
        Side::Ask => 1,
    }
}

fn type_code(t: OrderType) -> u8 {
    match t {
        OrderType::Limit => 0,
        OrderType::Market => 1,
    }
}

fn tif_code(tif: TimeInForce) -> u8 {
    match tif {
        TimeInForce::GoodTilCancelled => 0,
        TimeInForce::ImmediateOrCancel => 1,
        TimeInForce::FillOrKill => 2,
    }
}

const LEVEL_PRICE_DP: u32 = 8;
const LEVEL_SIZE_DP: u32 = 6;

/// Each level becomes `[price delta from previous level, size]`; the first
/// delta is taken from zero so the absolute price can be recovered.
fn encode_levels(levels: &[MarketLevel]) -> Value {
    let mut prev = Decimal::ZERO;
    let encoded: Vec<Value> = levels
        .iter()
        .map(|level| {
            let px = level.price.inner();
            let delta = (px - prev).abs();
            prev = px;
            json!([num(delta, LEVEL_PRICE_DP), num(level.size.inner(), LEVEL_SIZE_DP)])
        })
        .collect();
    Value::Array(encoded)
}

/// `[time_ms, [[dpx, sz], ...bids], [[dpx, sz], ...asks]]`
impl WireEncode for MarketUpdate {
    fn encode(&self) -> Value {
        json!([
            self.time.timestamp_millis(),
            encode_levels(&self.bids),
            encode_levels(&self.asks)
        ])
    }
}

/// Terminal orders shrink to `[id, status]`; live ones carry every field
/// the order blotter shows.
impl WireEncode for OrderStatusReport {
    fn encode(&self) -> Value {
        if self.status.is_terminal() {
            return json!([self.order_id.as_str(), self.status.code()]);
        }
        json!([
            self.order_id.as_str(),
            self.status.code(),
            self.exchange,
            num(self.price.inner(), LEVEL_PRICE_DP),
            num(self.quantity.inner(), LEVEL_SIZE_DP),
            side_code(self.side),
            type_code(self.order_type),
            tif_code(self.time_in_force),
            self.latency_ms,
            num(self.leaves_quantity.inner(), LEVEL_SIZE_DP),
            self.pair.quote
        ])
    }
}

/// `[base, quote, base_held, quote_held, value, quote_value, base_ccy, quote_ccy]`
impl WireEncode for PositionReport {
    fn encode(&self) -> Value {
        json!([
            num(self.base_amount, 3),
            num(self.quote_amount, 2),
            num(self.base_held_amount, 3),
            num(self.quote_held_amount, 2),
            num(self.value, 5),
            num(self.quote_value, 2),
            self.pair.base,
            self.pair.quote
        ])
    }
}

impl WireEncode for bool {}
impl WireEncode for String {}
impl WireEncode for FairValue {}
impl WireEncode for Trade {}
impl WireEncode for MarketTrade {}
impl WireEncode for TradeSafety {}
impl WireEncode for TargetBasePosition {}
impl WireEncode for TwoSidedQuoteStatus {}
impl WireEncode for QuotingParameters {}
impl WireEncode for ProductAdvertisement {}
impl WireEncode for ApplicationState {}
impl WireEncode for ConnectivityStatus {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use tribeca_core::{CurrencyPair, OrderId, OrderStatus, Price, Size};

    fn report(status: OrderStatus) -> OrderStatusReport {
        OrderStatusReport {
            order_id: OrderId::from("o-1"),
            exchange_id: None,
            exchange: "Null".to_string(),
            pair: CurrencyPair::new("BTC", "USD"),
            side: Side::Ask,
            price: Price::new(dec!(101.5)),
            quantity: Size::new(dec!(0.5)),
            leaves_quantity: Size::new(dec!(0.25)),
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::GoodTilCancelled,
            status,
            time: Utc.timestamp_millis_opt(0).unwrap(),
            latency_ms: Some(12),
            reject_reason: None,
        }
    }

    #[test]
    fn test_market_levels_are_price_deltas() {
        let time = Utc.timestamp_millis_opt(1_000).unwrap();
        let update = MarketUpdate::new(
            time,
            vec![
                MarketLevel::new(Price::new(dec!(100)), Size::new(dec!(1))),
                MarketLevel::new(Price::new(dec!(99.5)), Size::new(dec!(2))),
            ],
            vec![MarketLevel::new(Price::new(dec!(101)), Size::new(dec!(3)))],
        );

        let encoded = update.encode();
        assert_eq!(encoded, json!([1000, [[100.0, 1.0], [0.5, 2.0]], [[101.0, 3.0]]]));
        // Pure: encoding the same state twice yields the same tuple.
        assert_eq!(encoded, update.encode());
    }

    #[test]
    fn test_terminal_order_is_short() {
        let encoded = report(OrderStatus::Cancelled).encode();
        assert_eq!(encoded, json!(["o-1", 3]));
    }

    #[test]
    fn test_live_order_is_full_tuple() {
        let encoded = report(OrderStatus::Working).encode();
        let arr = encoded.as_array().unwrap();
        assert_eq!(arr.len(), 11);
        assert_eq!(arr[0], "o-1");
        assert_eq!(arr[3], json!(101.5));
        assert_eq!(arr[5], json!(1));
        assert_eq!(arr[8], json!(12));
        assert_eq!(arr[10], "USD");
    }

    #[test]
    fn test_position_rounding() {
        let report = PositionReport {
            base_amount: dec!(1.23456),
            quote_amount: dec!(100.456),
            base_held_amount: dec!(0),
            quote_held_amount: dec!(0),
            value: dec!(2.2391234),
            quote_value: dec!(223.9123),
            pair: CurrencyPair::new("BTC", "USD"),
            time: Utc.timestamp_millis_opt(0).unwrap(),
        };
        let encoded = report.encode();
        assert_eq!(encoded[0], json!(1.235));
        assert_eq!(encoded[1], json!(100.46));
        assert_eq!(encoded[4], json!(2.23912));
        assert_eq!(encoded[6], "BTC");
    }

    #[tokio::test]
    async fn test_snapshot_and_incremental_encodings_agree() {
        use crate::{MessageBus, Observable, Topic};

        let held = PositionReport {
            base_amount: dec!(0.5),
            quote_amount: dec!(950.125),
            base_held_amount: dec!(0.25),
            quote_held_amount: dec!(10),
            value: dec!(10.1),
            quote_value: dec!(1010),
            pair: CurrencyPair::new("BTC", "USD"),
            time: Utc.timestamp_millis_opt(5_000).unwrap(),
        };
        assert_eq!(held.encode(), held.encode());
        let working = report(OrderStatus::Working);
        assert_eq!(working.encode(), working.encode());

        let bus = MessageBus::new();
        let position = Observable::published(bus.publisher::<PositionReport>(Topic::Position)).unwrap();
        let mut early = bus.subscribe(Topic::Position);
        assert!(early.snapshot.is_empty());

        assert!(position.set(held.clone()));
        let late = bus.subscribe(Topic::Position);
        let incremental = early.messages.recv().await.unwrap();
        assert_eq!(late.snapshot, vec![incremental.clone()]);
        assert_eq!(incremental, held.encode());
    }
}
