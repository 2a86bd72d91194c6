//! Supervisor configuration
//!
//! Every field has a default, so an empty YAML document is a valid config.

use super::heartbeat::HeartbeatStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Delay before the first reconnection attempt
    pub base_delay_ms: u64,
    /// Upper bound for any single reconnection delay
    pub max_delay_ms: u64,
    pub max_retries: u32,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_strategy: HeartbeatStrategy,
    /// Bound on a single transport open
    ///
    /// Applied by the transport, not the supervisor: pass the config to
    /// `WebSocketTransport::from_config`. Custom adapters read it themselves.
    pub connect_timeout_ms: u64,
    /// Pause between teardown and reopen in `force_reconnect`
    pub force_reconnect_delay_ms: u64,
    /// Re-send `join_room` for every tracked room after re-authentication
    pub replay_rooms_on_reconnect: bool,
    /// Capacity of the client event channel; events beyond it are dropped
    pub event_channel_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 16_000,
            max_retries: 5,
            heartbeat_interval_ms: 35_000,
            heartbeat_strategy: HeartbeatStrategy::Active,
            connect_timeout_ms: 10_000,
            force_reconnect_delay_ms: 100,
            replay_rooms_on_reconnect: true,
            event_channel_capacity: 256,
        }
    }
}

impl SupervisorConfig {
    /// Load configuration from YAML file
    pub fn load(config_path: impl AsRef<Path>) -> ConfigResult<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        Self::from_yaml_str(&yaml_content)
    }

    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        // An empty document deserializes to unit, not to a map
        let config: SupervisorConfig = if yaml.trim().is_empty() {
            SupervisorConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.base_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "base_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::ValidationError(
                "max_delay_ms must be at least base_delay_ms".to_string(),
            ));
        }

        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "heartbeat_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "event_channel_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn force_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.force_reconnect_delay_ms)
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Supervisor configuration:");
        info!(
            "  Backoff: {}ms base, {}ms cap, {} retries",
            self.base_delay_ms, self.max_delay_ms, self.max_retries
        );
        info!(
            "  Heartbeat: {:?} every {}ms",
            self.heartbeat_strategy, self.heartbeat_interval_ms
        );
        info!("  Connect timeout: {}ms", self.connect_timeout_ms);
        info!("  Replay rooms on reconnect: {}", self.replay_rooms_on_reconnect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = SupervisorConfig::from_yaml_str("").unwrap();
        assert_eq!(config, SupervisorConfig::default());
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(35));
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_partial_override() {
        let config = SupervisorConfig::from_yaml_str(
            "max_retries: 3\nheartbeat_strategy: passive\nreplay_rooms_on_reconnect: false\n",
        )
        .unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.heartbeat_strategy, HeartbeatStrategy::Passive);
        assert!(!config.replay_rooms_on_reconnect);
        assert_eq!(config.base_delay_ms, 1_000);
    }

    #[test]
    fn test_validation_rejects_inverted_delays() {
        let err = SupervisorConfig::from_yaml_str("base_delay_ms: 5000\nmax_delay_ms: 1000\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "connect_timeout_ms: 2500").unwrap();
        let config = SupervisorConfig::load(file.path()).unwrap();
        assert_eq!(config.connect_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn test_missing_file() {
        let err = SupervisorConfig::load("/nonexistent/tether.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileError(_)));
    }
}
