//! Configuration for the limiter backends and the example server.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration for [`RedisLimiter`](crate::limiter::RedisLimiter).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Prefix prepended to every storage key.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Upper bound on each Redis round trip, in milliseconds.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl RedisConfig {
    /// The per-command timeout as a [`Duration`].
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

fn default_prefix() -> String {
    "limiter:".to_string()
}

fn default_command_timeout_ms() -> u64 {
    5_000
}

/// Configuration for the example server binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Tokens earned per second for each client IP.
    #[serde(default = "default_rate_per_second")]
    pub rate_per_second: u64,

    /// Maximum burst granted to each client IP.
    #[serde(default = "default_burst")]
    pub burst: u64,

    /// Limiter configuration.
    #[serde(default)]
    pub limiter: RedisConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            redis_url: default_redis_url(),
            rate_per_second: default_rate_per_second(),
            burst: default_burst(),
            limiter: RedisConfig::default(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_rate_per_second() -> u64 {
    5
}

fn default_burst() -> u64 {
    10
}

impl ServerConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_config_defaults() {
        let config = RedisConfig::default();
        assert_eq!(config.prefix, "limiter:");
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn server_config_from_yaml_applies_defaults() {
        let yaml = r#"
listen_addr: 127.0.0.1:9999
limiter:
  prefix: "myapp:"
"#;
        let config = ServerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9999".parse().unwrap());
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.limiter.prefix, "myapp:");
        assert_eq!(config.limiter.command_timeout_ms, 5_000);
    }

    #[test]
    fn server_config_rejects_invalid_yaml() {
        let err = ServerConfig::from_yaml("listen_addr: [not, an, addr]").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
