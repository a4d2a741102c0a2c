//! Core configuration types and loading.

use super::defaults::{
    default_cors_allow_any_origin, default_lock_timeout_ms, default_max_attempts,
    default_metrics_port,
};
use crate::caps::{AuthorityParams, PrincipalId};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Control plane configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Listener and identity.
    pub server: ServerConfig,
    /// Root authorities.
    #[serde(default)]
    pub authority: AuthorityConfig,
    /// Grant serialization tuning.
    #[serde(default)]
    pub grant: GrantConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parameters for the capability authority.
    pub fn authority_params(&self) -> AuthorityParams {
        AuthorityParams {
            roots: self.authority.roots.clone(),
            lock_timeout: Duration::from_millis(self.grant.lock_timeout_ms),
            max_attempts: self.grant.max_attempts,
        }
    }
}

/// Server identity and listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Display name used in logs (e.g., "cp.lab.example").
    pub name: String,
    /// Address the HTTP API binds to (e.g., "0.0.0.0:8081").
    pub listen: SocketAddr,
    /// Prometheus metrics HTTP port (default: 9090, 0 disables).
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Allow cross-origin requests from any origin (default: true).
    /// The dashboard page is served from a different origin.
    #[serde(default = "default_cors_allow_any_origin")]
    pub cors_allow_any_origin: bool,
}

/// Root authority configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorityConfig {
    /// Principals allowed to issue root capabilities and to offer
    /// candidates without holding a parent credential.
    #[serde(default)]
    pub roots: Vec<PrincipalId>,
}

/// Grant lock configuration.
///
/// A grant waits at most `max_attempts * lock_timeout_ms` for the request
/// lock before failing with `Contention`.
#[derive(Debug, Clone, Deserialize)]
pub struct GrantConfig {
    /// Lock attempts before surfacing contention (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Milliseconds per lock attempt (default: 250).
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}
