//! Balances reported by the exchange and the derived portfolio valuation.

use crate::{CurrencyPair, Price};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Balance of one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyPosition {
    pub currency: String,
    /// Free amount, available for new orders.
    pub amount: Decimal,
    /// Amount reserved by resting orders.
    pub held_amount: Decimal,
}

impl CurrencyPosition {
    pub fn new(currency: impl Into<String>, amount: Decimal, held_amount: Decimal) -> Self {
        Self {
            currency: currency.into().to_uppercase(),
            amount,
            held_amount,
        }
    }

    pub fn total(&self) -> Decimal {
        self.amount + self.held_amount
    }
}

/// Portfolio of the traded pair, valued at fair value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionReport {
    pub base_amount: Decimal,
    pub quote_amount: Decimal,
    pub base_held_amount: Decimal,
    pub quote_held_amount: Decimal,
    /// Whole portfolio expressed in the base currency.
    pub value: Decimal,
    /// Whole portfolio expressed in the quote currency.
    pub quote_value: Decimal,
    pub pair: CurrencyPair,
    pub time: DateTime<Utc>,
}

impl PositionReport {
    /// Value `base` and `quote` balances at `fair_value`.
    ///
    /// Returns `None` for a non-positive fair value.
    pub fn valued(
        base: &CurrencyPosition,
        quote: &CurrencyPosition,
        fair_value: Price,
        pair: CurrencyPair,
        time: DateTime<Utc>,
    ) -> Option<Self> {
        if !fair_value.is_positive() {
            return None;
        }
        let fv = fair_value.inner();
        let base_total = base.total();
        let quote_total = quote.total();
        Some(Self {
            base_amount: base.amount,
            quote_amount: quote.amount,
            base_held_amount: base.held_amount,
            quote_held_amount: quote.held_amount,
            value: base_total + quote_total / fv,
            quote_value: quote_total + base_total * fv,
            pair,
            time,
        })
    }

    /// Base inventory including the part held by resting asks.
    pub fn total_base(&self) -> Decimal {
        self.base_amount + self.base_held_amount
    }
}
