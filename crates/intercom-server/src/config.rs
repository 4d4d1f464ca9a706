//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (INTERCOM_*)
//! - TOML configuration file
//!
//! Required values are checked at load time; the server refuses to start
//! without an auth secret rather than failing on the first request.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer-token verification.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Media-bridge endpoint.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Store retry policy.
    #[serde(default)]
    pub store: StoreConfig,

    /// Call lifecycle tuning.
    #[serde(default)]
    pub calls: CallsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Bearer-token verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret used to verify bearer tokens. Required.
    #[serde(default = "default_auth_secret")]
    pub secret: String,
}

/// Media-bridge endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Base URL of the media bridge's conference API.
    #[serde(default = "default_bridge_url")]
    pub base_url: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_bridge_timeout")]
    pub request_timeout_ms: u64,
}

/// Store retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Attempts for a conditional update before conflict exhaustion.
    #[serde(default = "default_conflict_attempts")]
    pub conflict_attempts: u32,

    /// Attempts for a backend operation across transient faults.
    #[serde(default = "default_transient_attempts")]
    pub transient_attempts: u32,

    /// First transient-retry delay in milliseconds; doubles per attempt.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
}

/// Call lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallsConfig {
    /// How long an unanswered offer may live before the timeout sweep ends
    /// it, in milliseconds.
    #[serde(default = "default_offer_timeout")]
    pub offer_timeout_ms: u64,

    /// Interval between timeout sweeps, in milliseconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("INTERCOM_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("INTERCOM_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_auth_secret() -> String {
    std::env::var("INTERCOM_AUTH_SECRET").unwrap_or_default()
}

fn default_bridge_url() -> String {
    std::env::var("INTERCOM_BRIDGE_URL").unwrap_or_else(|_| "http://127.0.0.1:8188".to_string())
}

fn default_bridge_timeout() -> u64 {
    5_000
}

fn default_conflict_attempts() -> u32 {
    3
}

fn default_transient_attempts() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    25
}

fn default_offer_timeout() -> u64 {
    60_000
}

fn default_sweep_interval() -> u64 {
    15_000
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth: AuthConfig::default(),
            bridge: BridgeConfig::default(),
            store: StoreConfig::default(),
            calls: CallsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: default_auth_secret(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_bridge_url(),
            request_timeout_ms: default_bridge_timeout(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            conflict_attempts: default_conflict_attempts(),
            transient_attempts: default_transient_attempts(),
            backoff_base_ms: default_backoff_base(),
        }
    }
}

impl Default for CallsConfig {
    fn default() -> Self {
        Self {
            offer_timeout_ms: default_offer_timeout(),
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults, then validate.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or if
    /// a required value (the auth secret) is absent.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "intercom.toml",
            "/etc/intercom/intercom.toml",
            "~/.config/intercom/intercom.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// result fails validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check required values.
    ///
    /// # Errors
    ///
    /// Returns an error if the auth secret is absent.
    pub fn validate(&self) -> Result<()> {
        if self.auth.secret.is_empty() {
            bail!("auth.secret is required (set it in intercom.toml or INTERCOM_AUTH_SECRET)");
        }
        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host/port do not form a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// The retry policy the store should run with.
    #[must_use]
    pub fn retry_policy(&self) -> intercom_store::RetryPolicy {
        intercom_store::RetryPolicy {
            max_conflict_attempts: self.store.conflict_attempts,
            max_transient_attempts: self.store.transient_attempts,
            base_delay: Duration::from_millis(self.store.backoff_base_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_secret() -> Config {
        let mut config = Config::default();
        config.auth.secret = "test-secret".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.conflict_attempts, 3);
        assert_eq!(config.store.backoff_base_ms, 25);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_validation_requires_secret() {
        let mut config = Config::default();
        config.auth.secret = String::new();
        assert!(config.validate().is_err());
        assert!(with_secret().validate().is_ok());
    }

    #[test]
    fn test_config_bind_addr() {
        let config = with_secret();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), config.port);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [auth]
            secret = "s3cret"

            [store]
            conflict_attempts = 5

            [calls]
            offer_timeout_ms = 30000
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.auth.secret, "s3cret");
        assert_eq!(config.store.conflict_attempts, 5);
        assert_eq!(config.calls.offer_timeout_ms, 30_000);
        // Untouched sections keep defaults
        assert_eq!(config.bridge.request_timeout_ms, 5_000);
    }

    #[test]
    fn test_retry_policy_mapping() {
        let mut config = with_secret();
        config.store.backoff_base_ms = 10;
        let policy = config.retry_policy();
        assert_eq!(policy.max_conflict_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
    }
}
