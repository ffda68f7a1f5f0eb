//! Public trades seen on the exchange tape.
//!
//! Each print is annotated with our quote and the top of book at the time,
//! kept in a bounded recent window for the topic snapshot, persisted and
//! published.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};
use tribeca_bus::{BatchPolicy, BusResult, MessageBus, Publisher, Topic};
use tribeca_core::{CurrencyPair, GatewayMarketTrade, MarketTrade, MarketUpdate, TwoSidedQuote};
use tribeca_persistence::Persister;

/// Recent public trades kept for new subscribers.
pub const MARKET_TRADE_WINDOW: usize = 100;

pub struct MarketTradeBroker {
    exchange: String,
    pair: CurrencyPair,
    recent: Arc<RwLock<VecDeque<MarketTrade>>>,
    store: Arc<dyn Persister<MarketTrade>>,
    publisher: Publisher<MarketTrade>,
}

impl MarketTradeBroker {
    /// Seed the window from `store` and register the topic snapshot.
    pub fn new(
        exchange: impl Into<String>,
        pair: CurrencyPair,
        bus: &MessageBus,
        batch: &BatchPolicy,
        store: Arc<dyn Persister<MarketTrade>>,
    ) -> BusResult<Self> {
        let history = match store.load_all(MARKET_TRADE_WINDOW) {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "Failed to load market trades, starting empty");
                Vec::new()
            }
        };
        let recent = Arc::new(RwLock::new(VecDeque::from(history)));

        let publisher = bus.publisher::<MarketTrade>(Topic::MarketTrade).batched(batch);
        let snapshot = recent.clone();
        publisher.register_snapshot(move || snapshot.read().iter().cloned().collect())?;

        Ok(Self {
            exchange: exchange.into(),
            pair,
            recent,
            store,
            publisher,
        })
    }

    /// Record a print from the tape.
    pub fn on_trade(
        &mut self,
        print: GatewayMarketTrade,
        quote: Option<TwoSidedQuote>,
        book: Option<&MarketUpdate>,
    ) -> MarketTrade {
        let trade = MarketTrade::new(self.exchange.clone(), self.pair.clone(), print, quote, book);
        debug!(
            price = %trade.price,
            size = %trade.size,
            make_side = %trade.make_side,
            "Market trade"
        );
        {
            let mut recent = self.recent.write();
            if recent.len() >= MARKET_TRADE_WINDOW {
                recent.pop_front();
            }
            recent.push_back(trade.clone());
        }
        if let Err(e) = self.store.save(&trade) {
            warn!(error = %e, "Failed to persist market trade");
        }
        self.publisher.publish(&trade);
        trade
    }

    pub fn recent(&self) -> Vec<MarketTrade> {
        self.recent.read().iter().cloned().collect()
    }
}
