//! Configuration management for Souq services.
//!
//! All Souq services share a unified configuration file at `~/.souq/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Explicit config file values
//! 2. Environment variables (SOUQ_* prefix)
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `SOUQ_GATEWAY_HOST` → gateway.host
//! - `SOUQ_GATEWAY_PORT` → gateway.port
//! - `SOUQ_CONFIRM_TTL_SECONDS` → confirmation.ttl_seconds
//! - `SOUQ_LOG_LEVEL` → observability.log_level
//! - `SOUQ_LOG_FORMAT` → observability.log_format

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::{Result, ResultExt};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".souq"),
        |dirs| dirs.home_dir().join(".souq"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Gateway service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind address for the gateway.
    /// Default: "127.0.0.1" (conservative, local only)
    #[serde(default = "default_host")]
    pub host: String,

    /// Port number for the gateway
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

const fn default_port() -> u16 {
    8710
}

/// Confirmation protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Time-to-live for a pending confirmation, in seconds.
    /// After this elapses an unanswered confirmation can no longer execute.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

const fn default_ttl_seconds() -> u64 {
    300
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format: "json" for structured JSON, "pretty" for human-readable
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

/// Localization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleConfig {
    /// Default reply language when the user's language cannot be detected
    /// ("en" or "ar").
    #[serde(default = "default_language")]
    pub default_language: String,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
        }
    }
}

fn default_language() -> String {
    "en".into()
}

/// Unified configuration for Souq services.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Gateway service settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Confirmation protocol settings
    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    /// Logging and tracing settings
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Localization settings
    #[serde(default)]
    pub locale: LocaleConfig,
}

impl Config {
    /// Load configuration from the default path, applying environment overrides.
    ///
    /// A missing config file is not an error; defaults are used.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load configuration from an explicit path, applying environment overrides.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .context(format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str::<Self>(&content)
                .context(format!("Failed to parse config file {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply SOUQ_* environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SOUQ_GATEWAY_HOST") {
            self.gateway.host = host;
        }
        if let Ok(port) = std::env::var("SOUQ_GATEWAY_PORT") {
            if let Ok(port) = port.parse() {
                self.gateway.port = port;
            }
        }
        if let Ok(ttl) = std::env::var("SOUQ_CONFIRM_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse() {
                self.confirmation.ttl_seconds = ttl;
            }
        }
        if let Ok(level) = std::env::var("SOUQ_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("SOUQ_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.port, 8710);
        assert_eq!(config.confirmation.ttl_seconds, 300);
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.locale.default_language, "en");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("missing.json")).unwrap();
        assert_eq!(config.confirmation.ttl_seconds, 300);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "confirmation": { "ttl_seconds": 60 }, "gateway": { "port": 9000 } }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.confirmation.ttl_seconds, 60);
        assert_eq!(config.gateway.port, 9000);
        // Untouched sections keep defaults
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.observability.log_format, "pretty");
    }

    #[test]
    fn test_load_invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
