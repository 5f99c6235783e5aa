//! Strata - write-back entity cache over a document store.
//!
//! ## Architecture
//!
//! - `cache` - Per-collection TTL caches with read-through and write-back
//! - `store` - Document store adapters (MongoDB, in-memory)
//! - `models` - Cached entity models
//! - `config` - Environment configuration

pub mod cache;
pub mod config;
pub mod models;
pub mod store;

pub use cache::{CacheError, CacheOptions, CacheRegistry, CachedEntity, EntityCache, SyncReport};
pub use store::{DocumentStore, MemoryStore, MongoStore, StoreError};
