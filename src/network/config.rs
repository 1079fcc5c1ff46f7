//! Server Configuration
//!
//! Read once at startup from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Origins allowed to call the API cross-origin. Empty disables CORS handling.
    pub allowed_origins: Vec<String>,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Time allowed to receive a full request head.
    pub request_timeout: Duration,
    /// Server version string.
    pub version: String,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            allowed_origins: Vec::new(),
            max_connections: 1000,
            request_timeout: Duration::from_secs(30),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    ///
    /// - `BIND_ADDR` (default `0.0.0.0:8000`)
    /// - `ALLOWED_ORIGINS` comma-separated list (default empty)
    /// - `MAX_CONNECTIONS` (default 1000)
    /// - `REQUEST_TIMEOUT_SECS` (default 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("BIND_ADDR") {
            config.bind_addr = parse_var("BIND_ADDR", value)?;
        }
        if let Some(value) = lookup("ALLOWED_ORIGINS") {
            config.allowed_origins = parse_origins(&value);
        }
        if let Some(value) = lookup("MAX_CONNECTIONS") {
            config.max_connections = parse_var("MAX_CONNECTIONS", value)?;
        }
        if let Some(value) = lookup("REQUEST_TIMEOUT_SECS") {
            let secs: u64 = parse_var("REQUEST_TIMEOUT_SECS", value)?;
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// Split a comma-separated origin list, dropping blank entries.
pub fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { name, value })
}
