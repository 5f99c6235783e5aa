//! Cache module - write-back entity caching in front of a document store.
//!
//! ## Architecture
//!
//! - `CacheRegistry` - Central registry holding one cache per collection
//! - `EntityCache` - TTL-bounded map for one collection with read-through,
//!   write-back on expiry/delete, manual sync and a background sweeper
//! - `CacheKey` - Maps a string key to the store's `_id` or generic `id` field
//!
//! ## Usage
//!
//! ```rust,ignore
//! let voice = registry.create_or_get::<VoiceData>(CacheOptions::from_secs("voiceData", 3600))?;
//!
//! voice.set(user_id, data);            // memory only
//! let data = voice.get(user_id).await; // memory, else the store
//! voice.del(user_id);                  // written back, then gone
//! ```

mod config;
mod entity;
mod error;
mod key;
mod registry;
mod stats;

pub use config::{CacheOptions, MAX_TTL};
pub use entity::{CachedEntity, EntityCache};
pub use error::CacheError;
pub use key::{CacheKey, ID_FIELD, NATIVE_ID_FIELD};
pub use registry::CacheRegistry;
pub use stats::{CacheStatsSnapshot, SyncReport};
