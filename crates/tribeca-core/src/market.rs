//! Market data types: traded pair, book snapshots, public trades and fair value.

use crate::error::CoreError;
use crate::{Price, Side, Size, TwoSidedQuote};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Traded pair in `BASE/QUOTE` form (e.g. `BTC/USD`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) if !base.trim().is_empty() && !quote.trim().is_empty() => {
                Ok(Self::new(base.trim(), quote.trim()))
            }
            _ => Err(CoreError::InvalidPair(format!(
                "expected BASE/QUOTE, got '{s}'"
            ))),
        }
    }
}

/// One price level of the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketLevel {
    pub price: Price,
    pub size: Size,
}

impl MarketLevel {
    pub fn new(price: Price, size: Size) -> Self {
        Self { price, size }
    }
}

/// Order book snapshot.
///
/// Bids are ordered best (highest) first, asks best (lowest) first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketUpdate {
    pub time: DateTime<Utc>,
    pub bids: Vec<MarketLevel>,
    pub asks: Vec<MarketLevel>,
}

impl MarketUpdate {
    pub fn new(time: DateTime<Utc>, bids: Vec<MarketLevel>, asks: Vec<MarketLevel>) -> Self {
        Self { time, bids, asks }
    }

    pub fn best_bid(&self) -> Option<&MarketLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&MarketLevel> {
        self.asks.first()
    }

    /// True when both sides are present and the best bid is at or above the best ask.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    /// Distance between the best ask and best bid, if both exist.
    pub fn spread(&self) -> Option<Price> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }
}

/// Print on the exchange's public tape, as the gateway reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayMarketTrade {
    pub time: DateTime<Utc>,
    pub price: Price,
    pub size: Size,
    /// Side of the resting order that was hit.
    pub make_side: Side,
}

/// Public trade together with our quote and the top of book when it printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketTrade {
    pub exchange: String,
    pub pair: CurrencyPair,
    pub time: DateTime<Utc>,
    pub price: Price,
    pub size: Size,
    pub make_side: Side,
    pub quote: Option<TwoSidedQuote>,
    pub bid: Option<MarketLevel>,
    pub ask: Option<MarketLevel>,
}

impl MarketTrade {
    pub fn new(
        exchange: impl Into<String>,
        pair: CurrencyPair,
        print: GatewayMarketTrade,
        quote: Option<TwoSidedQuote>,
        book: Option<&MarketUpdate>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            pair,
            time: print.time,
            price: print.price,
            size: print.size,
            make_side: print.make_side,
            quote,
            bid: book.and_then(|b| b.best_bid().copied()),
            ask: book.and_then(|b| b.best_ask().copied()),
        }
    }
}

/// Reference price derived from the filtered book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FairValue {
    pub time: DateTime<Utc>,
    pub price: Price,
}

impl FairValue {
    pub fn new(time: DateTime<Utc>, price: Price) -> Self {
        Self { time, price }
    }
}
