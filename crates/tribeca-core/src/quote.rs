//! Quotes proposed by the quoting engine and their exposure status.

use crate::{Price, Side, Size};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub price: Price,
    pub size: Size,
}

impl Quote {
    pub fn new(price: Price, size: Size) -> Self {
        Self { price, size }
    }
}

/// Desired quote per side; `None` means "do not quote this side".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TwoSidedQuote {
    pub bid: Option<Quote>,
    pub ask: Option<Quote>,
}

impl TwoSidedQuote {
    pub fn new(bid: Option<Quote>, ask: Option<Quote>) -> Self {
        Self { bid, ask }
    }

    pub fn side(&self, side: Side) -> Option<Quote> {
        match side {
            Side::Bid => self.bid,
            Side::Ask => self.ask,
        }
    }

    /// True when both sides are present and the bid is at or above the ask.
    pub fn is_self_crossed(&self) -> bool {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QuoteStatus {
    /// Computed but deliberately kept off the market.
    #[default]
    Held,
    /// Sent (or being sent) to the exchange.
    Live,
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Held => write!(f, "Held"),
            Self::Live => write!(f, "Live"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TwoSidedQuoteStatus {
    pub bid_status: QuoteStatus,
    pub ask_status: QuoteStatus,
}

impl TwoSidedQuoteStatus {
    pub fn new(bid_status: QuoteStatus, ask_status: QuoteStatus) -> Self {
        Self {
            bid_status,
            ask_status,
        }
    }
}
