//! Main application orchestration.
//!
//! Builds the components in dependency order:
//! - message bus
//! - exchange gateway and persistence stores
//! - quoting engine (repositories, brokers, pipeline)
//! - operator console
//!
//! then runs one event loop that serializes gateway events and operator
//! commands into the engine. On shutdown every open order is cancelled
//! under a bounded timeout before the gateway is disconnected.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use chrono::Utc;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tribeca_broker::{CombinedGateway, GatewayEvent, NullGateway};
use tribeca_bus::{MessageBus, Observable, Topic};
use tribeca_core::{ApplicationState, CurrencyPair, MarketTrade, QuotingParameters, Trade};
use tribeca_engine::{
    register_operator_commands, Engine, EngineEvent, EngineStores, ShutdownOutcome,
};
use tribeca_persistence::JsonLinesStore;
use tribeca_telemetry::Metrics;

/// What a finished run looked like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: ShutdownOutcome,
    pub events_processed: u64,
    pub trades: usize,
}

/// Main application.
pub struct Application {
    config: AppConfig,
    pair: CurrencyPair,
}

impl Application {
    /// Validate the configuration. Unknown exchanges and malformed pairs
    /// are rejected here, before anything is started.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        let pair = config.currency_pair()?;
        Ok(Self { config, pair })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<RunSummary> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await
    }

    /// Run until `shutdown` resolves, then cancel every open order and stop.
    pub async fn run_until<F>(self, shutdown: F) -> AppResult<RunSummary>
    where
        F: Future<Output = ()>,
    {
        info!(
            exchange = %self.config.exchange,
            pair = %self.pair,
            environment = %self.config.environment,
            "Starting application"
        );

        let bus = MessageBus::new();
        let gateway = self.build_gateway()?;
        let stores = self.open_stores()?;
        let mut engine = Engine::new(
            &bus,
            self.config.engine.clone(),
            gateway.clone(),
            stores,
            self.config.quoting.clone(),
            self.config.start_active,
            self.config.environment.clone(),
        )?;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<EngineEvent>();
        register_operator_commands(&bus, &event_tx)?;

        let (gateway_tx, mut gateway_rx) = mpsc::unbounded_channel::<GatewayEvent>();
        let forward_tx = event_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = gateway_rx.recv().await {
                if forward_tx.send(EngineEvent::Gateway(event)).is_err() {
                    break;
                }
            }
        });
        gateway.connect(gateway_tx)?;

        let batch_token = CancellationToken::new();
        let batch_flusher = tokio::spawn(
            engine
                .batch_policy()
                .run(batch_token.clone().cancelled_owned()),
        );

        let console_token = CancellationToken::new();
        let console = if self.config.console.enabled {
            let bus = bus.clone();
            let config = self.config.console.clone();
            let stop = console_token.clone().cancelled_owned();
            Some(tokio::spawn(async move {
                if let Err(e) = tribeca_console::run_server(bus, config, stop).await {
                    error!(error = %e, "Operator console failed");
                }
            }))
        } else {
            info!("Operator console disabled");
            None
        };

        let app_state =
            Observable::<ApplicationState>::published(bus.publisher(Topic::ApplicationState))?;
        let started = Instant::now();
        let latency_warn = self.config.runtime.latency_warn();
        let mut probe = tokio::time::interval(self.config.runtime.probe_interval());
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);
        info!("Entering main event loop");

        loop {
            tokio::select! {
                Some(event) = event_rx.recv() => {
                    let handled = panic::catch_unwind(AssertUnwindSafe(|| {
                        engine.handle(event, Utc::now())
                    }));
                    if handled.is_err() {
                        error!("Unhandled fault while processing an event, shutting down");
                        break;
                    }
                }

                scheduled = probe.tick() => {
                    let delay = Instant::now().saturating_duration_since(scheduled);
                    let delay_ms = delay.as_millis() as u64;
                    Metrics::event_loop_delay(delay.as_secs_f64() * 1000.0);
                    if delay > latency_warn {
                        warn!(delay_ms, threshold_ms = latency_warn.as_millis() as u64, "Event loop delay above threshold");
                    }
                    app_state.set(ApplicationState {
                        time: Utc::now(),
                        uptime_secs: started.elapsed().as_secs(),
                        event_loop_delay_ms: delay_ms,
                        events_processed: engine.events_processed(),
                    });
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!(events = engine.events_processed(), "Shutting down");

        let exit_timeout = self.config.runtime.exit_timeout();
        let cancel_timeout = engine.config().cancel_all_timeout();
        let cancelled = tokio::time::timeout(
            exit_timeout,
            engine.cancel_all_orders(&mut event_rx, cancel_timeout),
        )
        .await;
        let outcome = match cancelled {
            Ok(outcome) => outcome,
            Err(_) => {
                let remaining = engine.broker().live_count();
                warn!(remaining, "Exit timeout reached while cancelling orders");
                ShutdownOutcome::TimedOut { remaining }
            }
        };

        gateway.disconnect();
        console_token.cancel();
        if let Some(console) = console {
            if tokio::time::timeout(exit_timeout, console).await.is_err() {
                warn!("Operator console did not stop in time");
            }
        }
        forwarder.abort();
        batch_token.cancel();
        if batch_flusher.await.is_err() {
            warn!("Publish batching task failed");
        }

        let summary = RunSummary {
            outcome,
            events_processed: engine.events_processed(),
            trades: engine.broker().trades().len(),
        };
        info!(
            outcome = ?summary.outcome,
            events = summary.events_processed,
            trades = summary.trades,
            "Application stopped"
        );
        Ok(summary)
    }

    fn build_gateway(&self) -> AppResult<Arc<dyn CombinedGateway>> {
        match self.config.exchange.to_lowercase().as_str() {
            "null" => Ok(Arc::new(NullGateway::new(
                self.pair.clone(),
                self.config.null_gateway.clone(),
            ))),
            other => Err(AppError::Config(format!("Unknown exchange '{other}'"))),
        }
    }

    fn open_stores(&self) -> AppResult<EngineStores> {
        let dir = &self.config.persistence.data_dir;
        info!(data_dir = %dir.display(), "Opening stores");
        Ok(EngineStores {
            parameters: Arc::new(JsonLinesStore::<QuotingParameters>::open(
                dir,
                "quotingParameters",
            )?),
            active: Arc::new(JsonLinesStore::<bool>::open(dir, "active")?),
            trades: Arc::new(JsonLinesStore::<Trade>::open(dir, "trades")?),
            market_trades: Arc::new(JsonLinesStore::<MarketTrade>::open(dir, "mt")?),
        })
    }
}
