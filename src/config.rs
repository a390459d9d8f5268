//! Configuration management for Stratgate.
//!
//! Configuration comes from an optional YAML file followed by environment
//! variables prefixed with `STRATGATE__` (sections separated by `__`, e.g.
//! `STRATGATE__SERVER__HTTP_ADDR`). Preset limits are additionally
//! overridable through `RATE_LIMIT_<NAME>_MAX` and
//! `RATE_LIMIT_<NAME>_WINDOW_MS`.

use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{GuardError, Result};
use crate::ratelimit::{PresetOverride, PresetTable, DEFAULT_CLEANUP_INTERVAL_MS};

/// Prefix for environment configuration.
pub const ENV_PREFIX: &str = "STRATGATE";

/// Main configuration for the Stratgate service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuardConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// API key configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitingConfig {
    /// Minimum time between lazy cleanup sweeps, in milliseconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_ms: u64,

    /// Interval of the optional background sweep, in seconds
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,

    /// Preset applied to every `/v1` request
    #[serde(default = "default_api_preset")]
    pub api_preset: String,

    /// Per-preset overrides keyed by preset name
    #[serde(default)]
    pub presets: HashMap<String, PresetOverride>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_ms: default_cleanup_interval(),
            sweep_interval_secs: None,
            api_preset: default_api_preset(),
            presets: HashMap::new(),
        }
    }
}

fn default_cleanup_interval() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_MS
}

fn default_api_preset() -> String {
    "default".to_string()
}

/// Shared-secret API key configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Expected API key; the guard is disabled when unset
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Header carrying the key
    #[serde(default = "default_auth_header")]
    pub header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            header: default_auth_header(),
        }
    }
}

fn default_auth_header() -> String {
    "x-api-key".to_string()
}

impl GuardConfig {
    /// Load configuration from an optional file plus the environment.
    ///
    /// `API_KEY` is accepted as a fallback for `auth.api_key`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        builder =
            builder.add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"));

        let mut config: GuardConfig = builder.build()?.try_deserialize()?;

        if config.auth.api_key.is_none() {
            config.auth.api_key = std::env::var("API_KEY")
                .ok()
                .filter(|key| !key.is_empty())
                .map(SecretString::new);
        }

        Ok(config)
    }

    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| GuardError::Config(e.to_string()))
    }

    /// Build the effective preset table.
    ///
    /// File overrides are applied first, then `RATE_LIMIT_*` environment
    /// values, so the environment wins.
    pub fn preset_table(&self) -> PresetTable {
        self.preset_table_with(|key| std::env::var(key).ok())
    }

    /// Build the preset table using a custom environment lookup.
    pub fn preset_table_with<F>(&self, lookup: F) -> PresetTable
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut table = PresetTable::builtin();
        table.apply_overrides(&self.rate_limiting.presets);
        table.apply_env(lookup);
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::RateLimitPreset;
    use secrecy::ExposeSecret;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GuardConfig::default();
        assert_eq!(config.server.http_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.server.log_format, LogFormat::Text);
        assert_eq!(config.rate_limiting.cleanup_interval_ms, 300_000);
        assert_eq!(config.rate_limiting.sweep_interval_secs, None);
        assert_eq!(config.rate_limiting.api_preset, "default");
        assert!(config.auth.api_key.is_none());
        assert_eq!(config.auth.header, "x-api-key");
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
server:
  http_addr: "0.0.0.0:9000"
  log_format: json
rate_limiting:
  cleanup_interval_ms: 1000
  sweep_interval_secs: 30
  api_preset: chat
  presets:
    bulk:
      max_requests: 2
auth:
  api_key: "s3cret"
  header: "x-dashboard-key"
"#;
        let config = GuardConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.http_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.server.log_format, LogFormat::Json);
        assert_eq!(config.rate_limiting.cleanup_interval_ms, 1_000);
        assert_eq!(config.rate_limiting.sweep_interval_secs, Some(30));
        assert_eq!(config.rate_limiting.api_preset, "chat");
        assert_eq!(
            config.auth.api_key.as_ref().map(|k| k.expose_secret().as_str()),
            Some("s3cret")
        );
        assert_eq!(config.auth.header, "x-dashboard-key");

        let table = config.preset_table_with(|_| None);
        assert_eq!(table.get("bulk"), RateLimitPreset::new(2, 60_000));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = GuardConfig::from_yaml("server: {}\n").unwrap();
        assert_eq!(config.server.http_addr, default_http_addr());
        assert_eq!(config.rate_limiting.cleanup_interval_ms, 300_000);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = GuardConfig::from_yaml("server: [not, a, map]").unwrap_err();
        assert!(matches!(err, GuardError::Config(_)));
    }

    #[test]
    fn test_env_overrides_take_precedence_over_file() {
        let yaml = r#"
rate_limiting:
  presets:
    chat:
      max_requests: 40
      window_ms: 10000
"#;
        let config = GuardConfig::from_yaml(yaml).unwrap();
        let table = config.preset_table_with(|key| {
            (key == "RATE_LIMIT_CHAT_MAX").then(|| "5".to_string())
        });
        assert_eq!(table.get("chat"), RateLimitPreset::new(5, 10_000));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "server:\n  http_addr: \"127.0.0.1:9100\"").unwrap();

        let config = GuardConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.http_addr, "127.0.0.1:9100".parse().unwrap());
    }

    #[test]
    fn test_from_file_parses_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "auth:\n  header: \"x-key\"").unwrap();

        let path = file.path().to_str().unwrap();
        let config = GuardConfig::from_file(path).unwrap();
        assert_eq!(config.auth.header, "x-key");
        assert!(config.auth.api_key.is_none());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = GuardConfig::load(Some(Path::new("/nonexistent/stratgate.yaml")));
        assert!(matches!(result, Err(GuardError::Config(_))));
    }
}
