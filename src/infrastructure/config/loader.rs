use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use super::Config;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_agents: {0}. Must be between 1 and 100")]
    InvalidMaxAgents(usize),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.abathur/config.yaml` (created by `init`)
    /// 3. `.abathur/local.yaml` (optional local overrides)
    /// 4. `ABATHUR_*` environment variables
    pub fn load() -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".abathur/config.yaml"))
            .merge(Yaml::file(".abathur/local.yaml"))
            .merge(Env::prefixed("ABATHUR_").split("__"))
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.swarm.max_agents == 0 || config.swarm.max_agents > 100 {
            return Err(ConfigError::InvalidMaxAgents(config.swarm.max_agents));
        }
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if !matches!(
            config.logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        if !matches!(config.logging.format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::{DatabaseConfig, LogSettings, SwarmSettings};

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(ConfigLoader::validate(&config).is_ok());
        assert_eq!(config.database.path, ".abathur/abathur.db");
        assert_eq!(config.swarm.max_agents, 3);
        assert_eq!(config.swarm.poll_interval_secs, 2);
    }

    #[test]
    fn test_invalid_max_agents_rejected() {
        let config = Config {
            swarm: SwarmSettings {
                max_agents: 0,
                ..SwarmSettings::default()
            },
            ..Config::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxAgents(0))
        ));
    }

    #[test]
    fn test_empty_db_path_rejected() {
        let config = Config {
            database: DatabaseConfig {
                path: String::new(),
            },
            ..Config::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDatabasePath)
        ));
    }

    #[test]
    fn test_bad_log_settings_rejected() {
        let config = Config {
            logging: LogSettings {
                level: "verbose".to_string(),
                ..LogSettings::default()
            },
            ..Config::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));

        let config = Config {
            logging: LogSettings {
                format: "xml".to_string(),
                ..LogSettings::default()
            },
            ..Config::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }

    #[test]
    fn test_load_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "database:\n  path: /tmp/custom.db\nswarm:\n  max_agents: 7\n",
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.database.path, "/tmp/custom.db");
        assert_eq!(config.swarm.max_agents, 7);
        // Untouched sections keep defaults.
        assert_eq!(config.swarm.poll_interval_secs, 2);
    }
}
