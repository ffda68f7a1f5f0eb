//! Process-wide "trading enabled" state.
//!
//! The operator toggles the saved state; trading is effectively active
//! only while the saved state is on and the exchange is connected. The
//! saved state survives restarts through the repository.

use std::sync::Arc;
use tracing::{info, warn};
use tribeca_bus::{MessageBus, Observable, Topic};
use tribeca_core::ConnectivityStatus;
use tribeca_persistence::Repository;
use tribeca_telemetry::Metrics;

use crate::error::EngineResult;

pub struct ActiveRepository {
    saved: bool,
    connectivity: ConnectivityStatus,
    effective: Observable<bool>,
    store: Arc<dyn Repository<bool>>,
}

impl ActiveRepository {
    /// `start_active` forces trading on at start; otherwise the last saved
    /// state is restored (off if none).
    pub fn new(
        bus: &MessageBus,
        store: Arc<dyn Repository<bool>>,
        start_active: bool,
    ) -> EngineResult<Self> {
        let saved = if start_active {
            true
        } else {
            match store.load_latest() {
                Ok(saved) => saved.unwrap_or(false),
                Err(e) => {
                    warn!(error = %e, "Failed to load active state, starting inactive");
                    false
                }
            }
        };
        info!(saved, "Active state loaded");
        Ok(Self {
            saved,
            connectivity: ConnectivityStatus::Disconnected,
            effective: Observable::published_with(bus.publisher(Topic::ActiveChange), false)?,
            store,
        })
    }

    pub fn is_active(&self) -> bool {
        self.effective.get().unwrap_or(false)
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn connectivity(&self) -> ConnectivityStatus {
        self.connectivity
    }

    /// Operator toggle. Returns whether the effective state changed.
    pub fn set_saved(&mut self, saved: bool) -> bool {
        if saved != self.saved {
            self.saved = saved;
            info!(saved, "Active state toggled");
            if let Err(e) = self.store.save(&saved) {
                warn!(error = %e, "Failed to persist active state");
            }
        }
        self.update()
    }

    /// Exchange connectivity change. Returns whether the effective state changed.
    pub fn on_connectivity(&mut self, status: ConnectivityStatus) -> bool {
        self.connectivity = status;
        self.update()
    }

    fn update(&mut self) -> bool {
        let effective = self.saved && self.connectivity.is_connected();
        let changed = self.effective.set(effective);
        if changed {
            info!(active = effective, "Trading {}", if effective { "enabled" } else { "disabled" });
            Metrics::active(effective);
        }
        changed
    }
}
