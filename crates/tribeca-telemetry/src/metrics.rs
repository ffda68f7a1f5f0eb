//! Prometheus metrics for the quoting pipeline.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means a duplicate metric name, which is a programming error that should
//! crash at first use rather than silently drop observations. These panics
//! can only occur during lazy static initialization.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram, Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, TextEncoder,
};

/// Exchange connectivity (1 = connected).
pub static EXCHANGE_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "tribeca_exchange_connected",
        "Exchange connectivity (1=connected)"
    )
    .unwrap()
});

/// Effective trading-enabled state (1 = active).
pub static ACTIVE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("tribeca_active", "Trading enabled (1=active)").unwrap()
});

pub static FAIR_VALUE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("tribeca_fair_value", "Latest published fair value").unwrap()
});

pub static TARGET_BASE_POSITION: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "tribeca_target_base_position",
        "Latest published target base position"
    )
    .unwrap()
});

/// Quote exposure per side (1 = live, 0 = held).
/// Labels: side (bid/ask)
pub static QUOTE_LIVE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "tribeca_quote_live",
        "Quote exposure per side (1=live)",
        &["side"]
    )
    .unwrap()
});

/// Trade safety values.
/// Labels: kind (buy/sell/combined)
pub static TRADE_SAFETY: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "tribeca_trade_safety",
        "Order-sized fills per minute in the safety window",
        &["kind"]
    )
    .unwrap()
});

/// Commands sent to the exchange.
/// Labels: kind (new/cancel/replace)
pub static ORDER_COMMANDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tribeca_order_commands_total",
        "Order-entry commands sent to the exchange",
        &["kind"]
    )
    .unwrap()
});

/// Order acknowledgements by resulting status.
pub static ORDER_UPDATES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tribeca_order_updates_total",
        "Order acknowledgements by resulting status",
        &["status"]
    )
    .unwrap()
});

pub static TRADES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("tribeca_trades_total", "Fills by side", &["side"]).unwrap()
});

pub static CROSSED_QUOTES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "tribeca_crossed_quotes_total",
        "Quote sides held because they would cross our other side"
    )
    .unwrap()
});

pub static ORDER_LATENCY_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "tribeca_order_latency_ms",
        "Submission to first acknowledgement latency in milliseconds",
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

pub static EVENT_LOOP_DELAY_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "tribeca_event_loop_delay_ms",
        "Observed event-loop scheduling delay in milliseconds",
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 121.0, 250.0, 500.0, 1000.0]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn exchange_connected(connected: bool) {
        EXCHANGE_CONNECTED.set(if connected { 1.0 } else { 0.0 });
    }

    pub fn active(active: bool) {
        ACTIVE.set(if active { 1.0 } else { 0.0 });
    }

    pub fn fair_value(value: f64) {
        FAIR_VALUE.set(value);
    }

    pub fn target_base_position(value: f64) {
        TARGET_BASE_POSITION.set(value);
    }

    pub fn quote_status(side: &str, live: bool) {
        QUOTE_LIVE
            .with_label_values(&[side])
            .set(if live { 1.0 } else { 0.0 });
    }

    pub fn trade_safety(buy: f64, sell: f64, combined: f64) {
        TRADE_SAFETY.with_label_values(&["buy"]).set(buy);
        TRADE_SAFETY.with_label_values(&["sell"]).set(sell);
        TRADE_SAFETY.with_label_values(&["combined"]).set(combined);
    }

    pub fn order_command(kind: &str) {
        ORDER_COMMANDS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn order_update(status: &str) {
        ORDER_UPDATES_TOTAL.with_label_values(&[status]).inc();
    }

    pub fn trade(side: &str) {
        TRADES_TOTAL.with_label_values(&[side]).inc();
    }

    pub fn crossed_quote() {
        CROSSED_QUOTES_TOTAL.inc();
    }

    pub fn order_latency(latency_ms: f64) {
        ORDER_LATENCY_MS.observe(latency_ms);
    }

    pub fn event_loop_delay(delay_ms: f64) {
        EVENT_LOOP_DELAY_MS.observe(delay_ms);
    }
}

/// Render every registered metric in the Prometheus text format.
pub fn gather_text() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buf)?;
    Ok(String::from_utf8(buf)?)
}
