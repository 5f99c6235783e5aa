//! Cache errors.

use thiserror::Error;

/// Errors raised while constructing or looking up caches.
///
/// Store failures never appear here: reads degrade to a miss and
/// write-backs are logged and dropped.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid options for cache '{collection}': {reason}")]
    InvalidOptions {
        collection: String,
        reason: &'static str,
    },

    #[error("cache '{collection}' must be created inside a tokio runtime")]
    NoRuntime { collection: String },

    #[error("cache '{collection}' holds {found}, requested as {expected}")]
    TypeMismatch {
        collection: String,
        expected: &'static str,
        found: &'static str,
    },
}
