//! Versioned quoting parameters.
//!
//! The only way strategy behavior changes at runtime. Every applied
//! change gets the next version, is broadcast on the parameters topic and
//! saved so the next start resumes from it.

use std::sync::Arc;
use tracing::{info, warn};
use tribeca_bus::{MessageBus, Observable, Topic};
use tribeca_core::QuotingParameters;
use tribeca_persistence::Repository;

use crate::error::EngineResult;

pub struct QuotingParametersRepository {
    latest: Observable<QuotingParameters>,
    store: Arc<dyn Repository<QuotingParameters>>,
}

impl QuotingParametersRepository {
    /// Start from the last saved version, falling back to `defaults` when
    /// nothing valid was saved.
    pub fn new(
        bus: &MessageBus,
        store: Arc<dyn Repository<QuotingParameters>>,
        defaults: QuotingParameters,
    ) -> EngineResult<Self> {
        defaults.validate()?;
        let initial = match store.load_latest() {
            Ok(Some(saved)) => match saved.validate() {
                Ok(()) => {
                    info!(version = saved.version, mode = %saved.mode, "Restored quoting parameters");
                    saved
                }
                Err(e) => {
                    warn!(error = %e, "Saved quoting parameters are invalid, using defaults");
                    defaults
                }
            },
            Ok(None) => defaults,
            Err(e) => {
                warn!(error = %e, "Failed to load quoting parameters, using defaults");
                defaults
            }
        };
        Ok(Self {
            latest: Observable::published_with(
                bus.publisher(Topic::QuotingParametersChange),
                initial,
            )?,
            store,
        })
    }

    pub fn latest(&self) -> QuotingParameters {
        // Seeded in `new`, never cleared.
        self.latest.get().unwrap_or_default()
    }

    /// Apply `next`. Returns `false` when it only repeats the current
    /// parameters.
    pub fn update(&mut self, mut next: QuotingParameters) -> EngineResult<bool> {
        next.validate()?;
        let current = self.latest();
        if !next.differs_from(&current) {
            return Ok(false);
        }
        next.version = current.version + 1;
        info!(
            version = next.version,
            mode = %next.mode,
            width = %next.width,
            "Quoting parameters changed"
        );
        self.latest.set(next.clone());
        if let Err(e) = self.store.save(&next) {
            warn!(version = next.version, error = %e, "Failed to persist quoting parameters");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use rust_decimal_macros::dec;
    use tribeca_core::{Price, QuotingMode};
    use tribeca_persistence::MemoryStore;

    #[test]
    fn test_starts_from_defaults() {
        let store = Arc::new(MemoryStore::<QuotingParameters>::new());
        let repo = QuotingParametersRepository::new(
            &MessageBus::null(),
            store,
            QuotingParameters::default(),
        )
        .unwrap();
        assert_eq!(repo.latest().version, 0);
    }

    #[test]
    fn test_restores_saved_version() {
        let saved = QuotingParameters {
            version: 7,
            mode: QuotingMode::Mid,
            ..Default::default()
        };
        let store = Arc::new(MemoryStore::with_records(vec![saved.clone()]));
        let repo = QuotingParametersRepository::new(
            &MessageBus::null(),
            store,
            QuotingParameters::default(),
        )
        .unwrap();
        assert_eq!(repo.latest(), saved);
    }

    #[tokio::test]
    async fn test_update_bumps_version_publishes_and_saves() {
        let bus = MessageBus::new();
        let store = Arc::new(MemoryStore::<QuotingParameters>::new());
        let mut repo =
            QuotingParametersRepository::new(&bus, store.clone(), QuotingParameters::default())
                .unwrap();
        let mut sub = bus.subscribe(Topic::QuotingParametersChange);
        assert_eq!(sub.snapshot.len(), 1);

        let next = QuotingParameters {
            width: Price::new(dec!(3)),
            ..Default::default()
        };
        assert!(repo.update(next.clone()).unwrap());
        assert_eq!(repo.latest().version, 1);
        assert_eq!(store.len(), 1);
        assert!(sub.messages.try_recv().is_ok());

        // Same values again: nothing happens.
        assert!(!repo.update(next).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalid_update_rejected() {
        let mut repo = QuotingParametersRepository::new(
            &MessageBus::null(),
            Arc::new(MemoryStore::<QuotingParameters>::new()),
            QuotingParameters::default(),
        )
        .unwrap();
        let bad = QuotingParameters {
            width: Price::ZERO,
            ..Default::default()
        };
        assert!(matches!(repo.update(bad), Err(EngineError::Parameters(_))));
        assert_eq!(repo.latest().version, 0);
    }
}
