//! CLI utilities for binaries
//!
//! Handles configuration paths and environment variables for all binary
//! executables.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Supervisor configuration (config/tether.yaml)
    Tether,
    /// Custom path
    Custom(String),
}

impl ConfigType {
    /// Get the default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Tether => "config/tether.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Get the environment variable name for this config type
    pub fn env_var_name(&self) -> &str {
        match self {
            ConfigType::Tether => "TETHER_CONFIG_PATH",
            ConfigType::Custom(_) => "CONFIG_PATH",
        }
    }
}

/// Load configuration path from environment or use default
///
/// # Examples
/// ```
/// use tether_client::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Tether);
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    std::env::var(config_type.env_var_name())
        .unwrap_or_else(|_| config_type.default_path().to_string())
        .into()
}

/// Parse command line arguments for a binary
///
/// Returns a vector of arguments (excluding the program name)
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

/// Split a comma-separated room list, skipping blanks and duplicates
pub fn parse_rooms(raw: &str) -> Vec<String> {
    let mut rooms: Vec<String> = Vec::new();
    for room in raw.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        if !rooms.iter().any(|r| r == room) {
            rooms.push(room.to_string());
        }
    }
    rooms
}

/// Settings of the probe binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    pub url: String,
    pub token: Option<String>,
    pub rooms: Vec<String>,
    pub config_path: PathBuf,
}

impl ProbeSettings {
    /// `TETHER_WS_URL` (required), `TETHER_TOKEN`, `TETHER_ROOMS`,
    /// `TETHER_CONFIG_PATH`
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("TETHER_WS_URL").context("TETHER_WS_URL is not set")?;
        Self::from_parts(
            &url,
            std::env::var("TETHER_TOKEN").ok(),
            std::env::var("TETHER_ROOMS").ok().as_deref(),
            load_config_from_env(ConfigType::Tether),
        )
    }

    pub fn from_parts(
        url: &str,
        token: Option<String>,
        rooms: Option<&str>,
        config_path: PathBuf,
    ) -> Result<Self> {
        let url = url.trim();
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            bail!("TETHER_WS_URL must start with ws:// or wss://, got '{}'", url);
        }

        Ok(Self {
            url: url.to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            rooms: rooms.map(parse_rooms).unwrap_or_default(),
            config_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_type_paths() {
        assert_eq!(ConfigType::Tether.default_path(), "config/tether.yaml");

        let custom = ConfigType::Custom("custom/path.yaml".to_string());
        assert_eq!(custom.default_path(), "custom/path.yaml");
    }

    #[test]
    fn test_parse_rooms() {
        assert_eq!(parse_rooms("lobby, support,,lobby ,  "), vec!["lobby", "support"]);
        assert!(parse_rooms("").is_empty());
    }

    #[test]
    fn test_settings_reject_http_url() {
        let err = ProbeSettings::from_parts("http://example.com", None, None, PathBuf::new());
        assert!(err.is_err());
    }

    #[test]
    fn test_blank_token_is_none() {
        let settings = ProbeSettings::from_parts(
            "wss://example.com/ws",
            Some("  ".to_string()),
            Some("lobby"),
            PathBuf::from("config/tether.yaml"),
        )
        .unwrap();
        assert_eq!(settings.token, None);
        assert_eq!(settings.rooms, vec!["lobby"]);
    }
}
