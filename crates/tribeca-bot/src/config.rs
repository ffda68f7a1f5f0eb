//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tribeca_broker::NullGatewayConfig;
use tribeca_console::ConsoleConfig;
use tribeca_core::{CurrencyPair, QuotingParameters};
use tribeca_engine::EngineConfig;

/// Exchange connectors bundled with this build.
pub const SUPPORTED_EXCHANGES: [&str; 1] = ["null"];

/// Storage locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding one `.jsonl` file per collection.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Event-loop timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Upper bound on the whole shutdown sequence (ms). Default: 2000.
    #[serde(default = "default_exit_timeout_ms")]
    pub exit_timeout_ms: u64,
    /// Event-loop delay above which a warning is logged (ms). Default: 121.
    #[serde(default = "default_latency_warn_ms")]
    pub latency_warn_ms: u64,
    /// Interval of the event-loop probe and heartbeat (ms). Default: 500.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

fn default_exit_timeout_ms() -> u64 {
    2000
}

fn default_latency_warn_ms() -> u64 {
    121
}

fn default_probe_interval_ms() -> u64 {
    500
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            exit_timeout_ms: default_exit_timeout_ms(),
            latency_warn_ms: default_latency_warn_ms(),
            probe_interval_ms: default_probe_interval_ms(),
        }
    }
}

impl RuntimeConfig {
    pub fn exit_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_timeout_ms)
    }

    pub fn latency_warn(&self) -> Duration {
        Duration::from_millis(self.latency_warn_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms.max(1))
    }
}

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Exchange connector name.
    #[serde(default = "default_exchange")]
    pub exchange: String,
    /// Traded pair, `BASE/QUOTE`.
    #[serde(default = "default_pair")]
    pub pair: String,
    /// Free-form deployment label shown to operators.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Start with trading enabled instead of restoring the saved state.
    #[serde(default)]
    pub start_active: bool,
    /// Quoting parameters used when none were saved.
    #[serde(default)]
    pub quoting: QuotingParameters,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub null_gateway: NullGatewayConfig,
}

fn default_exchange() -> String {
    "null".to_string()
}

fn default_pair() -> String {
    "BTC/USD".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exchange: default_exchange(),
            pair: default_pair(),
            environment: default_environment(),
            start_active: false,
            quoting: QuotingParameters::default(),
            persistence: PersistenceConfig::default(),
            console: ConsoleConfig::default(),
            engine: EngineConfig::default(),
            runtime: RuntimeConfig::default(),
            null_gateway: NullGatewayConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Reject anything that cannot run. Startup stops on the first problem.
    pub fn validate(&self) -> AppResult<()> {
        if !SUPPORTED_EXCHANGES.contains(&self.exchange.to_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "Unknown exchange '{}', supported: {}",
                self.exchange,
                SUPPORTED_EXCHANGES.join(", ")
            )));
        }
        self.currency_pair()?;
        self.quoting
            .validate()
            .map_err(|e| AppError::Config(format!("Invalid quoting parameters: {e}")))?;
        if self.console.enabled {
            self.console
                .socket_addr()
                .map_err(|e| AppError::Config(e.to_string()))?;
        }
        Ok(())
    }

    pub fn currency_pair(&self) -> AppResult<CurrencyPair> {
        self.pair
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid pair: {e}")))
    }
}
