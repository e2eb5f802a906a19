//! Proxy Configuration
//!
//! Settings consumed by the publish path:
//!
//! - **idle_expiry_secs**: close producers not used for this long (default: 600)
//! - **max_cache_entries**: maximum cached producers (default: 3000)
//! - **shard_count**: physical topics per logical topic, 0 disables (default: 0)
//! - **semantic**: when a publish is reported successful (default: at_least_once)
//! - **maintenance_interval_ms**: how often pending evictions run (default: 1000)
//! - **port**: HTTP listen port (default: 8080)
//!
//! ## Environment Variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `STREAMGATE_IDLE_EXPIRY_SECS` | `idle_expiry_secs` |
//! | `STREAMGATE_MAX_CACHE_ENTRIES` | `max_cache_entries` |
//! | `STREAMGATE_SHARD_COUNT` | `shard_count` (negative values disable) |
//! | `STREAMGATE_SEMANTIC` | `semantic` (`at_most_once` / `at_least_once`) |
//! | `STREAMGATE_MAINTENANCE_INTERVAL_MS` | `maintenance_interval_ms` |
//! | `API_PORT` | `port` |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::HandleCacheConfig;
use crate::error::ConfigError;

/// When a publish call is considered complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverySemantic {
    /// Succeed once the producer accepts the message; broker ack is only logged.
    AtMostOnce,
    /// Succeed only after the broker acknowledges the message.
    #[default]
    AtLeastOnce,
}

impl DeliverySemantic {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliverySemantic::AtMostOnce => "at_most_once",
            DeliverySemantic::AtLeastOnce => "at_least_once",
        }
    }
}

impl fmt::Display for DeliverySemantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliverySemantic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "at_most_once" => Ok(DeliverySemantic::AtMostOnce),
            "at_least_once" => Ok(DeliverySemantic::AtLeastOnce),
            other => Err(format!("unknown delivery semantic '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Seconds a producer may stay unused before it is closed (default: 600)
    #[serde(default = "default_idle_expiry_secs")]
    pub idle_expiry_secs: u64,

    /// Maximum number of cached producers (default: 3000)
    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: u64,

    /// Number of physical topics per logical topic; 0 disables sharding
    #[serde(default)]
    pub shard_count: u32,

    /// Delivery acknowledgment policy
    #[serde(default)]
    pub semantic: DeliverySemantic,

    /// Interval of the cache maintenance task in milliseconds (default: 1000)
    #[serde(default = "default_maintenance_interval_ms")]
    pub maintenance_interval_ms: u64,

    /// HTTP listen port (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            idle_expiry_secs: default_idle_expiry_secs(),
            max_cache_entries: default_max_cache_entries(),
            shard_count: 0,
            semantic: DeliverySemantic::default(),
            maintenance_interval_ms: default_maintenance_interval_ms(),
            port: default_port(),
        }
    }
}

impl ProxyConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "STREAMGATE_IDLE_EXPIRY_SECS")? {
            config.idle_expiry_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "STREAMGATE_MAX_CACHE_ENTRIES")? {
            config.max_cache_entries = v;
        }
        if let Some(v) = parse_var::<i64, _>(&lookup, "STREAMGATE_SHARD_COUNT")? {
            config.shard_count = u32::try_from(v.max(0)).map_err(|e| ConfigError::InvalidValue {
                var: "STREAMGATE_SHARD_COUNT",
                value: v.to_string(),
                reason: e.to_string(),
            })?;
        }
        if let Some(v) = parse_var(&lookup, "STREAMGATE_SEMANTIC")? {
            config.semantic = v;
        }
        if let Some(v) = parse_var(&lookup, "STREAMGATE_MAINTENANCE_INTERVAL_MS")? {
            config.maintenance_interval_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "API_PORT")? {
            config.port = v;
        }

        Ok(config)
    }

    pub fn cache_config(&self) -> HandleCacheConfig {
        HandleCacheConfig {
            max_entries: self.max_cache_entries,
            idle_expiry: Duration::from_secs(self.idle_expiry_secs),
        }
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms.max(1))
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            match parsed {
                Ok(parsed) => Ok(Some(parsed)),
                Err(e) => Err(ConfigError::InvalidValue {
                    var,
                    reason: e.to_string(),
                    value,
                }),
            }
        }
    }
}

fn default_idle_expiry_secs() -> u64 {
    600 // 10 minutes
}

fn default_max_cache_entries() -> u64 {
    3000
}

fn default_maintenance_interval_ms() -> u64 {
    1000
}

fn default_port() -> u16 {
    8080
}
