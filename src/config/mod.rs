//! Typed process configuration.
//!
//! Layout:
//! - `mod.rs`: the `Config` tree deserialized from JSON and environment
//! - `loader.rs`: `ConfigLoader`, which layers and validates the sources

use serde::{Deserialize, Serialize};
use validator::Validate;

pub mod loader;

pub use loader::ConfigLoader;

const DEFAULT_LOGLEVEL: &str = "info";
const DEFAULT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Config {
    #[serde(default)]
    #[validate(nested)]
    pub redis: StoreSettings,

    /// Fallback tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_loglevel")]
    pub loglevel: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis: StoreSettings::default(),
            loglevel: default_loglevel(),
        }
    }
}

/// Connection settings for the key-value store.
///
/// Host, port, credentials and database index are all carried by `url`,
/// e.g. `redis://:secret@127.0.0.1:6379/2`. A `memory://` url selects the
/// in-process store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StoreSettings {
    #[validate(length(min = 1, message = "redis.url is required"))]
    pub url: String,

    /// Seconds allowed for connecting and the liveness check.
    #[validate(range(min = 1, message = "redis.timeout must be at least 1"))]
    pub timeout: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl StoreSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout)
    }
}

fn default_loglevel() -> String {
    DEFAULT_LOGLEVEL.to_string()
}
