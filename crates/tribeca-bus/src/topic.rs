//! Topic catalog.

use crate::BusError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable topic keys shared with operator clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    ProductAdvertisement,
    ApplicationState,
    QuotingParametersChange,
    MarketData,
    MarketTrade,
    OrderStatusReports,
    Trades,
    Position,
    FairValue,
    TargetBasePosition,
    TradeSafetyValue,
    QuoteStatus,
    ActiveChange,
    Notepad,
    ToggleConfigs,
    ExchangeConnectivity,
    SubmitNewOrder,
    CancelOrder,
    CancelAllOrders,
    CleanAllClosedOrders,
    CleanAllOrders,
}

impl Topic {
    pub const ALL: [Topic; 21] = [
        Self::ProductAdvertisement,
        Self::ApplicationState,
        Self::QuotingParametersChange,
        Self::MarketData,
        Self::MarketTrade,
        Self::OrderStatusReports,
        Self::Trades,
        Self::Position,
        Self::FairValue,
        Self::TargetBasePosition,
        Self::TradeSafetyValue,
        Self::QuoteStatus,
        Self::ActiveChange,
        Self::Notepad,
        Self::ToggleConfigs,
        Self::ExchangeConnectivity,
        Self::SubmitNewOrder,
        Self::CancelOrder,
        Self::CancelAllOrders,
        Self::CleanAllClosedOrders,
        Self::CleanAllOrders,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProductAdvertisement => "productAdvertisement",
            Self::ApplicationState => "appState",
            Self::QuotingParametersChange => "quotingParametersChange",
            Self::MarketData => "marketData",
            Self::MarketTrade => "marketTrade",
            Self::OrderStatusReports => "orderStatusReports",
            Self::Trades => "trades",
            Self::Position => "position",
            Self::FairValue => "fairValue",
            Self::TargetBasePosition => "targetBasePosition",
            Self::TradeSafetyValue => "tradeSafetyValue",
            Self::QuoteStatus => "quoteStatus",
            Self::ActiveChange => "activeChange",
            Self::Notepad => "notepad",
            Self::ToggleConfigs => "toggleConfigs",
            Self::ExchangeConnectivity => "exchangeConnectivity",
            Self::SubmitNewOrder => "submitNewOrder",
            Self::CancelOrder => "cancelOrder",
            Self::CancelAllOrders => "cancelAllOrders",
            Self::CleanAllClosedOrders => "cleanAllClosedOrders",
            Self::CleanAllOrders => "cleanAllOrders",
        }
    }

    /// Topics where every message is an event of its own. On the others
    /// each message replaces the previous state.
    pub fn is_event_stream(&self) -> bool {
        matches!(
            self,
            Self::MarketTrade | Self::OrderStatusReports | Self::Trades
        )
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| BusError::UnknownTopic(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_are_unique_and_parse_back() {
        let keys: HashSet<_> = Topic::ALL.iter().map(|t| t.as_str()).collect();
        assert_eq!(keys.len(), Topic::ALL.len());

        for topic in Topic::ALL {
            assert_eq!(topic.as_str().parse::<Topic>().unwrap(), topic);
        }
    }

    #[test]
    fn test_event_streams() {
        assert!(Topic::MarketTrade.is_event_stream());
        assert!(Topic::Trades.is_event_stream());
        assert!(!Topic::MarketData.is_event_stream());
        assert_eq!("toggleConfigs".parse::<Topic>().unwrap(), Topic::ToggleConfigs);
    }

    #[test]
    fn test_unknown_topic() {
        assert!("nope".parse::<Topic>().is_err());
    }
}
