//! Harness configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port the first node binds; node i binds `base_port + i`
    pub base_port: u16,

    /// Log file path, truncated at the start of every run
    pub log_file: String,

    /// Per-request timeout for overlay operations, in milliseconds
    pub op_timeout_ms: u64,

    /// Bootstrap retry policy
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Maximum join attempts per node
    pub max_attempts: u32,

    /// Backoff unit in milliseconds; the delay before retry k is
    /// `2^(k-1)` units
    pub backoff_unit_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_port: 8468,
            log_file: "network.log".to_string(),
            op_timeout_ms: 500,
            bootstrap: BootstrapConfig {
                max_attempts: 5,
                backoff_unit_ms: 1000,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}
