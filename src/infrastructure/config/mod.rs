//! Hierarchical configuration.
//!
//! Precedence, lowest to highest: programmatic defaults, project
//! `.abathur/config.yaml`, project `.abathur/local.yaml`, then `ABATHUR_*`
//! environment variables. Configuration is always project-local so multiple
//! swarms can coexist on one machine.

mod loader;

pub use loader::{ConfigError, ConfigLoader};

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub swarm: SwarmSettings,
    #[serde(default)]
    pub logging: LogSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            swarm: SwarmSettings::default(),
            logging: LogSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    ".abathur/abathur.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmSettings {
    /// Maximum concurrent agents.
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
    /// Poll interval in seconds when the queue is empty.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for SwarmSettings {
    fn default() -> Self {
        Self {
            max_agents: default_max_agents(),
            poll_interval_secs: default_poll_interval_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_max_agents() -> usize {
    3
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (json, pretty).
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files; stdout-only when unset.
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
