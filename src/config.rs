//! Ambient configuration for the demo binaries.
//!
//! A small `Config`, loadable from TOML via `serde`, for the
//! session/cache defaults a deployment wants to tune without
//! recompiling. Library constructors ([`crate::cache::PredictionCache::new`],
//! [`crate::rpc::Session::new`]) never require a `Config` — this is
//! convenience for `src/bin/`, not a replacement for constructor
//! arguments.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::rpc::SessionConfig;

/// Error loading a [`Config`] from disk.
///
/// Distinct from [`crate::error::CoreError`]: a malformed config file is
/// a caller/deployment mistake discovered once at startup, not a
/// transport failure the session loop should reconnect on.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config at {path}: {source}")]
    Malformed {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub session: SessionConfigToml,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            session: SessionConfigToml::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfigToml {
    pub poll_tick_millis: u64,
    pub activity_timeout_millis: u64,
    pub event_history_capacity: usize,
}

impl Default for SessionConfigToml {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            poll_tick_millis: defaults.poll_tick.as_millis() as u64,
            activity_timeout_millis: defaults.activity_timeout.as_millis() as u64,
            event_history_capacity: defaults.event_history_capacity,
        }
    }
}

impl From<SessionConfigToml> for SessionConfig {
    fn from(toml: SessionConfigToml) -> Self {
        SessionConfig {
            poll_tick: Duration::from_millis(toml.poll_tick_millis),
            activity_timeout: Duration::from_millis(toml.activity_timeout_millis),
            event_history_capacity: toml.event_history_capacity,
        }
    }
}

impl Config {
    /// Load from a TOML file. An absent file or absent key is not an
    /// error — only a malformed one — so defaults fill in the rest.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|err| ConfigError::Malformed {
                path: path.to_path_buf(),
                source: err,
            }),
            Err(_) => Ok(Self::default()),
        }
    }
}
