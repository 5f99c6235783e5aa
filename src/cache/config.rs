//! Cache construction options.

use std::time::Duration;

use super::CacheError;

/// Fraction of the TTL used as sweep interval when none is given.
const DEFAULT_SWEEP_RATIO: f64 = 0.2;

/// Longest accepted TTL or sweep interval: one year.
///
/// Expiry deadlines are `Instant`s, which cannot hold arbitrary offsets.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Options for one entity cache, keyed by the collection it fronts.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOptions {
    /// Name of the backing collection. Unique per logical collection.
    pub collection_name: String,

    /// Time-to-live for entries. Re-armed on every `set`.
    pub ttl: Duration,

    /// How often the sweeper looks for expired entries.
    /// Defaults to one fifth of the TTL.
    pub sweep_interval: Option<Duration>,
}

impl CacheOptions {
    /// Create options for the given collection and TTL.
    pub fn new(collection_name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            collection_name: collection_name.into(),
            ttl,
            sweep_interval: None,
        }
    }

    /// Create options with a TTL given in whole seconds.
    pub fn from_secs(collection_name: impl Into<String>, ttl_secs: u64) -> Self {
        Self::new(collection_name, Duration::from_secs(ttl_secs))
    }

    /// Set the sweep interval (builder pattern).
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Sweep interval actually used by the cache.
    pub fn effective_sweep_interval(&self) -> Duration {
        self.sweep_interval
            .unwrap_or_else(|| self.ttl.mul_f64(DEFAULT_SWEEP_RATIO))
    }

    /// Check the options describe a usable cache.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidOptions`] for an empty collection name,
    /// or a TTL or sweep interval that is zero or longer than [`MAX_TTL`].
    pub fn validate(&self) -> Result<(), CacheError> {
        let reason = if self.collection_name.trim().is_empty() {
            "collection name must not be empty"
        } else if self.ttl.is_zero() {
            "ttl must be positive"
        } else if self.ttl > MAX_TTL {
            "ttl must not exceed one year"
        } else if self.effective_sweep_interval().is_zero() {
            "sweep interval must be positive"
        } else if self.effective_sweep_interval() > MAX_TTL {
            "sweep interval must not exceed one year"
        } else {
            return Ok(());
        };

        Err(CacheError::InvalidOptions {
            collection: self.collection_name.clone(),
            reason,
        })
    }
}
