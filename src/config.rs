//! Runtime configuration.
//!
//! Settings come from an optional YAML file named by `PEERHTTP_CONFIG`,
//! falling back to defaults for anything left out, and the `LISTEN`
//! environment variable overrides the server's listen address.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::http::parser::Limits;

/// Environment variable naming a YAML config file.
pub const CONFIG_ENV: &str = "PEERHTTP_CONFIG";

/// Environment variable overriding `server.listen_addr`.
pub const LISTEN_ENV: &str = "LISTEN";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the binary listens on.
    pub listen_addr: String,
    /// Unsent response bytes at which a connection that is handed another
    /// reply gets aborted. A single reply may be larger.
    pub max_write_buffer: usize,
    /// Most requests per connection awaiting a reply before reading pauses.
    pub max_pipeline: usize,
    pub limits: Limits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            max_write_buffer: 1024 * 1024,
            max_pipeline: 16,
            limits: Limits::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Whole-request deadline in milliseconds; 0 disables it.
    pub timeout_ms: u64,
    pub user_agent: String,
    pub limits: Limits,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            user_agent: crate::client::DEFAULT_USER_AGENT.to_string(),
            limits: Limits::default(),
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

impl Config {
    /// Loads the file named by `PEERHTTP_CONFIG`, if any, then applies the
    /// `LISTEN` override.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(addr) = std::env::var(LISTEN_ENV) {
            cfg.server.listen_addr = addr;
        }

        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.server.max_pipeline > 0, "server.max_pipeline must be positive");
        anyhow::ensure!(
            self.server.max_write_buffer > 0,
            "server.max_write_buffer must be positive"
        );
        for limits in [&self.server.limits, &self.client.limits] {
            anyhow::ensure!(limits.max_line > 0, "limits.max_line must be positive");
            anyhow::ensure!(limits.max_headers > 0, "limits.max_headers must be positive");
        }
        Ok(())
    }
}
