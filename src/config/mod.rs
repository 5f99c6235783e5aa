//! Configuration module for Strata.
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::cache::{CacheOptions, MAX_TTL};

/// Errors raised while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a whole number of seconds no longer than a year, got '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Default cache settings applied to every collection the process caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub ttl: Duration,

    /// Sweep interval. `None` means one fifth of the TTL.
    pub sweep_interval: Option<Duration>,

    /// Interval of the periodic sync checkpoint. `None` disables it.
    pub sync_interval: Option<Duration>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600), // 1 hour
            sweep_interval: None,
            sync_interval: Some(Duration::from_secs(300)), // 5 minutes
        }
    }
}

impl CacheSettings {
    /// Build cache options for a collection from these settings.
    pub fn options_for(&self, collection_name: &str) -> CacheOptions {
        let options = CacheOptions::new(collection_name, self.ttl);
        match self.sweep_interval {
            Some(interval) => options.sweep_interval(interval),
            None => options,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// MongoDB connection string. Without one the process runs on an
    /// in-memory store.
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,

    pub cache: CacheSettings,
}

impl Config {
    /// Load configuration from environment variables (and `.env`).
    ///
    /// # Errors
    /// Returns error if a numeric variable is set but is not a whole number
    /// of seconds within [`MAX_TTL`], or is zero where zero is meaningless.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = CacheSettings::default();

        let ttl = match parse_secs(&lookup, "CACHE_TTL_SECS")? {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    var: "CACHE_TTL_SECS",
                    value: "0".to_string(),
                });
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.ttl,
        };

        let sweep_interval = match parse_secs(&lookup, "CACHE_SWEEP_SECS")? {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    var: "CACHE_SWEEP_SECS",
                    value: "0".to_string(),
                });
            }
            other => other.map(Duration::from_secs),
        };

        // 0 turns the checkpoint off.
        let sync_interval = match parse_secs(&lookup, "CACHE_SYNC_INTERVAL_SECS")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.sync_interval,
        };

        Ok(Self {
            mongodb_uri: lookup("MONGODB_URI").filter(|s| !s.trim().is_empty()),
            mongodb_database: lookup("MONGODB_DATABASE").unwrap_or_else(|| "strata".to_string()),
            cache: CacheSettings {
                ttl,
                sweep_interval,
                sync_interval,
            },
        })
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    match u64::from_str(raw.trim()) {
        Ok(secs) if secs <= MAX_TTL.as_secs() => Ok(Some(secs)),
        _ => Err(ConfigError::Invalid { var, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.mongodb_uri, None);
        assert_eq!(config.mongodb_database, "strata");
        assert_eq!(config.cache, CacheSettings::default());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("MONGODB_URI", "mongodb://localhost:27017"),
            ("MONGODB_DATABASE", "bot"),
            ("CACHE_TTL_SECS", "120"),
            ("CACHE_SWEEP_SECS", "10"),
            ("CACHE_SYNC_INTERVAL_SECS", "0"),
        ])
        .unwrap();

        assert_eq!(config.mongodb_uri.as_deref(), Some("mongodb://localhost:27017"));
        assert_eq!(config.mongodb_database, "bot");
        assert_eq!(config.cache.ttl, Duration::from_secs(120));
        assert_eq!(config.cache.sweep_interval, Some(Duration::from_secs(10)));
        assert_eq!(config.cache.sync_interval, None);

        let options = config.cache.options_for("voiceData");
        assert_eq!(options.collection_name, "voiceData");
        assert_eq!(options.effective_sweep_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_numbers() {
        assert_eq!(
            load(&[("CACHE_TTL_SECS", "soon")]).unwrap_err(),
            ConfigError::Invalid {
                var: "CACHE_TTL_SECS",
                value: "soon".to_string()
            }
        );
        assert!(load(&[("CACHE_TTL_SECS", "0")]).is_err());
        assert!(load(&[("CACHE_SWEEP_SECS", "0")]).is_err());
        assert!(load(&[("CACHE_SYNC_INTERVAL_SECS", "-5")]).is_err());
    }

    #[test]
    fn test_durations_beyond_a_year_are_rejected() {
        let max = MAX_TTL.as_secs().to_string();
        let too_long = (MAX_TTL.as_secs() + 1).to_string();
        let huge = u64::MAX.to_string();

        let config = load(&[("CACHE_TTL_SECS", &max)]).unwrap();
        assert_eq!(config.cache.ttl, MAX_TTL);
        assert!(config.cache.options_for("users").validate().is_ok());

        assert_eq!(
            load(&[("CACHE_TTL_SECS", &huge)]).unwrap_err(),
            ConfigError::Invalid {
                var: "CACHE_TTL_SECS",
                value: huge.clone()
            }
        );
        assert!(load(&[("CACHE_TTL_SECS", &too_long)]).is_err());
        assert!(load(&[("CACHE_SWEEP_SECS", &huge)]).is_err());
        assert!(load(&[("CACHE_SYNC_INTERVAL_SECS", &huge)]).is_err());
    }
}
