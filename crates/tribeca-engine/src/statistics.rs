//! Time-weighted EWMA estimators over the fair-value stream.
//!
//! The decay is driven by wall-clock time between samples rather than by
//! sample count: `alpha = 1 - 0.5^(dt / half_life)`. A sample that arrives
//! at the same instant as the previous one changes nothing, and the first
//! sample seeds the estimate exactly.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tribeca_core::{Price, QuotingParameters};

#[derive(Debug, Clone)]
pub struct Ewma {
    half_life_secs: u64,
    value: Option<Decimal>,
    last_update: Option<DateTime<Utc>>,
}

impl Ewma {
    pub fn new(half_life_secs: u64) -> Self {
        Self {
            half_life_secs,
            value: None,
            last_update: None,
        }
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }

    pub fn half_life_secs(&self) -> u64 {
        self.half_life_secs
    }

    /// Change the decay period. The running estimate is kept.
    pub fn set_half_life(&mut self, half_life_secs: u64) {
        self.half_life_secs = half_life_secs;
    }

    /// Fold `sample` observed at `now` into the estimate.
    pub fn update(&mut self, sample: Decimal, now: DateTime<Utc>) -> Decimal {
        let (Some(value), Some(last)) = (self.value, self.last_update) else {
            self.value = Some(sample);
            self.last_update = Some(now);
            return sample;
        };
        let elapsed_ms = (now - last).num_milliseconds();
        if elapsed_ms <= 0 || self.half_life_secs == 0 {
            return value;
        }
        let alpha = decay_alpha(elapsed_ms as f64 / 1000.0, self.half_life_secs as f64);
        let next = value + alpha * (sample - value);
        self.value = Some(next);
        self.last_update = Some(now);
        next
    }
}

/// Weight of a new sample after `elapsed_secs`. Computed in f64 because
/// `rust_decimal` has no fractional powers without extra features.
fn decay_alpha(elapsed_secs: f64, half_life_secs: f64) -> Decimal {
    let alpha = 1.0 - 0.5_f64.powf(elapsed_secs / half_life_secs);
    Decimal::from_f64_retain(alpha.clamp(0.0, 1.0)).unwrap_or(Decimal::ONE)
}

/// Latest value of each estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EwmaSnapshot {
    pub long: Option<Decimal>,
    pub short: Option<Decimal>,
    pub quoting: Option<Decimal>,
}

/// Long, short and quoting EWMAs fed by fair value.
#[derive(Debug, Clone)]
pub struct TrendStatistics {
    long: Ewma,
    short: Ewma,
    quoting: Ewma,
}

impl TrendStatistics {
    pub fn new(params: &QuotingParameters) -> Self {
        Self {
            long: Ewma::new(params.long_ewma_half_life_secs),
            short: Ewma::new(params.short_ewma_half_life_secs),
            quoting: Ewma::new(params.quoting_ewma_half_life_secs),
        }
    }

    /// Apply new half-lives without resetting the estimates.
    pub fn reconfigure(&mut self, params: &QuotingParameters) {
        self.long.set_half_life(params.long_ewma_half_life_secs);
        self.short.set_half_life(params.short_ewma_half_life_secs);
        self.quoting.set_half_life(params.quoting_ewma_half_life_secs);
    }

    pub fn on_fair_value(&mut self, fair_value: Price, now: DateTime<Utc>) -> EwmaSnapshot {
        let px = fair_value.inner();
        self.long.update(px, now);
        self.short.update(px, now);
        self.quoting.update(px, now);
        self.snapshot()
    }

    pub fn snapshot(&self) -> EwmaSnapshot {
        EwmaSnapshot {
            long: self.long.value(),
            short: self.short.value(),
            quoting: self.quoting.value(),
        }
    }
}

/// Decimal to f64 for metrics.
pub(crate) fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
