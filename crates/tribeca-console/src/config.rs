//! Console configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

use crate::error::{ConsoleError, ConsoleResult};

/// Operator console settings. Basic auth is on only when both
/// credentials are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Concurrent operator sockets; further upgrades get 503.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_enabled() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> usize {
    10
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl ConsoleConfig {
    pub fn auth_enabled(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    pub fn socket_addr(&self) -> ConsoleResult<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConsoleError::InvalidHost(self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
