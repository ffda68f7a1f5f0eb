//! Quoting parameters: the only runtime knob that changes strategy behavior.

use crate::error::CoreError;
use crate::{Price, Size};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the quoting engine places its two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QuotingMode {
    /// Penny one tick inside the best qualifying level.
    Top,
    /// Symmetric width around fair value.
    Mid,
    /// Join the best qualifying level.
    Join,
    InverseJoin,
    InverseTop,
    PingPong,
    Boomerang,
    #[default]
    #[serde(rename = "AK47")]
    Ak47,
    Depth,
}

impl QuotingMode {
    /// Modes that pair fills into pings and pongs.
    #[must_use]
    pub fn is_ping_pong(&self) -> bool {
        matches!(self, Self::PingPong | Self::Boomerang | Self::Ak47)
    }
}

impl fmt::Display for QuotingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Top => "Top",
            Self::Mid => "Mid",
            Self::Join => "Join",
            Self::InverseJoin => "InverseJoin",
            Self::InverseTop => "InverseTop",
            Self::PingPong => "PingPong",
            Self::Boomerang => "Boomerang",
            Self::Ak47 => "AK47",
            Self::Depth => "Depth",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FairValueModel {
    /// Midpoint of best bid and best ask.
    #[default]
    #[serde(rename = "BBO")]
    Bbo,
    /// Size-weighted midpoint of best bid and best ask.
    #[serde(rename = "wBBO")]
    WeightedBbo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AutoPositionMode {
    Manual,
    #[default]
    EwmaBasic,
    EwmaLongShort,
}

/// Aggressive position rebalancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AprMode {
    #[default]
    Off,
    Size,
    SizeWidth,
}

/// Which sides may open a new ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PingAt {
    #[default]
    BothSides,
    BidSide,
    AskSide,
    DepletedSide,
    DepletedBidSide,
    DepletedAskSide,
    StopPings,
}

/// Which open pings are ponged first, and how aggressively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PongAt {
    #[default]
    ShortPingFair,
    LongPingFair,
    ShortPingAggressive,
    LongPingAggressive,
}

impl PongAt {
    /// Short pongs close the pings nearest to the current price first.
    #[must_use]
    pub fn is_short(&self) -> bool {
        matches!(self, Self::ShortPingFair | Self::ShortPingAggressive)
    }

    #[must_use]
    pub fn is_aggressive(&self) -> bool {
        matches!(self, Self::ShortPingAggressive | Self::LongPingAggressive)
    }
}

/// Versioned strategy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotingParameters {
    /// Assigned by the parameters repository on every applied change.
    #[serde(default)]
    pub version: u64,

    #[serde(default = "default_width")]
    pub width: Price,

    #[serde(default = "default_buy_size")]
    pub buy_size: Size,

    #[serde(default = "default_sell_size")]
    pub sell_size: Size,

    #[serde(default)]
    pub mode: QuotingMode,

    #[serde(default)]
    pub fv_model: FairValueModel,

    #[serde(default = "default_target_base_position")]
    pub target_base_position: Decimal,

    #[serde(default = "default_position_divergence")]
    pub position_divergence: Decimal,

    #[serde(default = "default_true")]
    pub ewma_protection: bool,

    #[serde(default)]
    pub auto_position_mode: AutoPositionMode,

    #[serde(default)]
    pub apr: AprMode,

    #[serde(default = "default_apr_multiplier")]
    pub apr_multiplier: Decimal,

    /// Trade-safety threshold, in order-sized fills per minute.
    #[serde(default = "default_trades_per_minute")]
    pub trades_per_minute: Decimal,

    /// Rolling window considered by the safety calculator.
    #[serde(default = "default_trade_rate_seconds")]
    pub trade_rate_seconds: u64,

    #[serde(default)]
    pub ping_at: PingAt,

    #[serde(default)]
    pub pong_at: PongAt,

    /// Maximum resting orders per side in AK47 mode.
    #[serde(default = "default_bullets")]
    pub bullets: u32,

    /// Minimum distance between AK47 bullets on the same side.
    #[serde(default = "default_range")]
    pub range: Price,

    /// Levels at or below this size are stepped over when joining the book.
    #[serde(default = "default_step_over_size")]
    pub step_over_size: Size,

    #[serde(default = "default_long_ewma_half_life_secs")]
    pub long_ewma_half_life_secs: u64,

    #[serde(default = "default_short_ewma_half_life_secs")]
    pub short_ewma_half_life_secs: u64,

    #[serde(default = "default_quoting_ewma_half_life_secs")]
    pub quoting_ewma_half_life_secs: u64,

    /// Batch high-frequency operator updates into one flush per this many
    /// seconds. Zero delivers immediately.
    #[serde(default)]
    pub delay_ui: u64,
}

fn default_width() -> Price {
    Price::new(dec!(2))
}

fn default_buy_size() -> Size {
    Size::new(dec!(0.02))
}

fn default_sell_size() -> Size {
    Size::new(dec!(0.01))
}

fn default_target_base_position() -> Decimal {
    dec!(1)
}

fn default_position_divergence() -> Decimal {
    dec!(0.9)
}

fn default_true() -> bool {
    true
}

fn default_apr_multiplier() -> Decimal {
    dec!(3)
}

fn default_trades_per_minute() -> Decimal {
    dec!(0.9)
}

fn default_trade_rate_seconds() -> u64 {
    569
}

fn default_bullets() -> u32 {
    2
}

fn default_range() -> Price {
    Price::new(dec!(0.5))
}

fn default_step_over_size() -> Size {
    Size::new(dec!(0.1))
}

fn default_long_ewma_half_life_secs() -> u64 {
    900
}

fn default_short_ewma_half_life_secs() -> u64 {
    300
}

fn default_quoting_ewma_half_life_secs() -> u64 {
    120
}

impl Default for QuotingParameters {
    fn default() -> Self {
        Self {
            version: 0,
            width: default_width(),
            buy_size: default_buy_size(),
            sell_size: default_sell_size(),
            mode: QuotingMode::default(),
            fv_model: FairValueModel::default(),
            target_base_position: default_target_base_position(),
            position_divergence: default_position_divergence(),
            ewma_protection: default_true(),
            auto_position_mode: AutoPositionMode::default(),
            apr: AprMode::default(),
            apr_multiplier: default_apr_multiplier(),
            trades_per_minute: default_trades_per_minute(),
            trade_rate_seconds: default_trade_rate_seconds(),
            ping_at: PingAt::default(),
            pong_at: PongAt::default(),
            bullets: default_bullets(),
            range: default_range(),
            step_over_size: default_step_over_size(),
            long_ewma_half_life_secs: default_long_ewma_half_life_secs(),
            short_ewma_half_life_secs: default_short_ewma_half_life_secs(),
            quoting_ewma_half_life_secs: default_quoting_ewma_half_life_secs(),
            delay_ui: 0,
        }
    }
}

impl QuotingParameters {
    /// Reject values that would make the quoting pipeline meaningless.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.width.is_positive() {
            return Err(CoreError::InvalidParameters(format!(
                "width must be positive, got {}",
                self.width
            )));
        }
        if !self.buy_size.is_positive() || !self.sell_size.is_positive() {
            return Err(CoreError::InvalidParameters(format!(
                "sizes must be positive, got buy={} sell={}",
                self.buy_size, self.sell_size
            )));
        }
        if self.position_divergence.is_sign_negative() {
            return Err(CoreError::InvalidParameters(
                "position_divergence must not be negative".to_string(),
            ));
        }
        if self.target_base_position.is_sign_negative() {
            return Err(CoreError::InvalidParameters(
                "target_base_position must not be negative".to_string(),
            ));
        }
        if self.apr_multiplier <= Decimal::ZERO {
            return Err(CoreError::InvalidParameters(format!(
                "apr_multiplier must be positive, got {}",
                self.apr_multiplier
            )));
        }
        if self.bullets == 0 {
            return Err(CoreError::InvalidParameters(
                "bullets must be at least 1".to_string(),
            ));
        }
        if self.trade_rate_seconds == 0 {
            return Err(CoreError::InvalidParameters(
                "trade_rate_seconds must be positive".to_string(),
            ));
        }
        if self.long_ewma_half_life_secs == 0
            || self.short_ewma_half_life_secs == 0
            || self.quoting_ewma_half_life_secs == 0
        {
            return Err(CoreError::InvalidParameters(
                "EWMA half-lives must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Batching delay for operator updates, `None` when immediate.
    pub fn ui_delay(&self) -> Option<std::time::Duration> {
        (self.delay_ui > 0).then(|| std::time::Duration::from_secs(self.delay_ui))
    }

    /// Configured order size for a side.
    pub fn size_for(&self, side: crate::Side) -> Size {
        match side {
            crate::Side::Bid => self.buy_size,
            crate::Side::Ask => self.sell_size,
        }
    }

    /// True when two parameter sets differ in anything but their version.
    pub fn differs_from(&self, other: &Self) -> bool {
        let mut a = self.clone();
        a.version = other.version;
        a != *other
    }
}
