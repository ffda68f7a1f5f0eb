//! Trend signal and the target base position derived from it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};
use tribeca_bus::{BusResult, MessageBus, Observable, Topic};
use tribeca_core::{
    AutoPositionMode, PositionReport, Price, QuotingParameters, Side, TargetBasePosition,
};
use tribeca_telemetry::Metrics;

use crate::statistics::{to_f64, EwmaSnapshot};

/// Scale applied to relative EWMA divergence before clamping to [-1, 1].
/// A 0.2% divergence saturates the signal.
const TREND_SCALE: Decimal = dec!(500);

/// Side that has to trade to bring `current` back within `tolerance` of
/// `target`: `Bid` when short of target, `Ask` when long, `None` inside.
pub fn position_divergence(target: Decimal, current: Decimal, tolerance: Decimal) -> Option<Side> {
    if current < target - tolerance {
        Some(Side::Bid)
    } else if current > target + tolerance {
        Some(Side::Ask)
    } else {
        None
    }
}

/// Normalized trend in [-1, 1] from EWMA divergence.
pub fn trend_signal(
    mode: AutoPositionMode,
    ewma: &EwmaSnapshot,
    fair_value: Option<Price>,
) -> Option<Decimal> {
    let raw = match mode {
        AutoPositionMode::Manual => return Some(Decimal::ZERO),
        AutoPositionMode::EwmaBasic => {
            let long = ewma.long.filter(|v| !v.is_zero())?;
            (fair_value?.inner() / long - Decimal::ONE) * TREND_SCALE
        }
        AutoPositionMode::EwmaLongShort => {
            let long = ewma.long.filter(|v| !v.is_zero())?;
            (ewma.short? / long - Decimal::ONE) * TREND_SCALE
        }
    };
    Some(raw.clamp(-Decimal::ONE, Decimal::ONE))
}

#[derive(Debug)]
pub struct PositionManager {
    trend: Option<Decimal>,
    threshold: Decimal,
}

impl PositionManager {
    pub fn new(threshold: Decimal) -> Self {
        Self {
            trend: None,
            threshold,
        }
    }

    pub fn trend(&self) -> Option<Decimal> {
        self.trend
    }

    /// Recompute the trend. Returns `true` when it moved by more than the
    /// threshold (or appeared for the first time).
    pub fn update(
        &mut self,
        mode: AutoPositionMode,
        ewma: &EwmaSnapshot,
        fair_value: Option<Price>,
    ) -> bool {
        let Some(next) = trend_signal(mode, ewma, fair_value) else {
            return false;
        };
        let changed = match self.trend {
            Some(prev) => (next - prev).abs() > self.threshold,
            None => true,
        };
        if changed {
            debug!(trend = %next, "Trend");
            self.trend = Some(next);
        }
        changed
    }
}

pub struct TargetBasePositionManager {
    target: Observable<TargetBasePosition>,
    threshold: Decimal,
}

impl TargetBasePositionManager {
    pub fn new(bus: &MessageBus, threshold: Decimal) -> BusResult<Self> {
        Ok(Self {
            target: Observable::published(bus.publisher(Topic::TargetBasePosition))?,
            threshold,
        })
    }

    pub fn latest(&self) -> Option<Decimal> {
        self.target.get().map(|t| t.data)
    }

    /// Recompute and publish the target.
    ///
    /// Manual mode publishes every change; the EWMA modes only moves larger
    /// than the threshold. The target never leaves `[0, portfolio value]`.
    pub fn recompute(
        &mut self,
        trend: Option<Decimal>,
        params: &QuotingParameters,
        report: Option<&PositionReport>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(report) = report else {
            return false;
        };
        let raw = match params.auto_position_mode {
            AutoPositionMode::Manual => params.target_base_position,
            _ => {
                let Some(trend) = trend else {
                    return false;
                };
                (Decimal::ONE + trend) / dec!(2) * report.value
            }
        };
        let data = raw.clamp(Decimal::ZERO, report.value.max(Decimal::ZERO));
        let threshold = match params.auto_position_mode {
            AutoPositionMode::Manual => Decimal::ZERO,
            _ => self.threshold,
        };
        let next = TargetBasePosition { time: now, data };
        let changed = self
            .target
            .set_if(next, |old, new| (new.data - old.data).abs() > threshold);
        if changed {
            info!(target = %data, mode = ?params.auto_position_mode, "Target base position");
            Metrics::target_base_position(to_f64(data));
        }
        changed
    }
}
