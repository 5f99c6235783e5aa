//! Entity cache - TTL-bounded write-back cache for one collection.
//!
//! Mutations stay in memory. A value reaches the store only when its entry
//! expires, when it is deleted, or when the cache is synced. `clear` drops
//! entries without writing anything.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use mongodb::bson;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::key::CacheKey;
use super::stats::{CacheStats, CacheStatsSnapshot, SyncReport};
use super::{CacheError, CacheOptions};
use crate::store::{DocumentStore, StoreError};

/// A document value that can live in an entity cache.
///
/// Implemented for every serde-serializable type that is cheap enough to clone.
pub trait CachedEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CachedEntity for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
    expires_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            inserted_at: now,
            expires_at: now + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Store access for one collection.
#[derive(Clone)]
struct Backend {
    collection: Arc<str>,
    store: Arc<dyn DocumentStore>,
    stats: Arc<CacheStats>,
}

impl Backend {
    /// Read-through fetch. Store and decode failures read as "not found".
    async fn fetch<T: CachedEntity>(&self, key: &str) -> Option<T> {
        let filter = CacheKey::parse(key).lookup_filter();
        self.stats.record_fetch();

        match self.store.fetch_one(&self.collection, filter).await {
            Ok(Some(document)) => match bson::from_document(document) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Failed to decode '{}' from {}: {}", key, self.collection, e);
                    None
                }
            },
            Ok(None) => {
                debug!("'{}' not found in {}", key, self.collection);
                None
            }
            Err(e) => {
                warn!("Read-through of '{}' from {} failed: {}", key, self.collection, e);
                None
            }
        }
    }

    /// Persist `value` under `key`. Failures are logged and reported, never raised.
    async fn write_back<T: CachedEntity>(&self, key: &str, value: &T) -> bool {
        let result = self.try_write_back(key, value).await;
        self.stats.record_write_back(result.is_ok());

        match result {
            Ok(()) => {
                debug!("Wrote back '{}' to {}", key, self.collection);
                true
            }
            Err(e) => {
                warn!("Write-back of '{}' to {} failed: {}", key, self.collection, e);
                false
            }
        }
    }

    async fn try_write_back<T: CachedEntity>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let mut document = bson::to_document(value)?;
        let filter = CacheKey::parse(key).prepare_write(&mut document);
        self.store.upsert_one(&self.collection, filter, document).await
    }

    /// Fire-and-forget write-back. A failure loses the value.
    fn spawn_write_back<T: CachedEntity>(&self, runtime: &Handle, key: String, value: T) {
        let backend = self.clone();
        runtime.spawn(async move {
            backend.write_back(&key, &value).await;
        });
    }
}

struct Inner<T> {
    entries: DashMap<String, CacheEntry<T>>,
    backend: Backend,
    ttl: Duration,
    sweep_interval: Duration,
    runtime: Handle,
    stop: Arc<Notify>,
}

impl<T: CachedEntity> Inner<T> {
    /// Remove every entry expired at `now` and write each back.
    fn evict_expired(&self, now: Instant) -> usize {
        let expired = self.expired_keys(now);
        self.evict_keys(expired, now)
    }

    fn expired_keys(&self, now: Instant) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn evict_keys(&self, keys: Vec<String>, now: Instant) -> usize {
        let mut evicted = 0;
        for key in keys {
            // A `set` since the scan re-armed the entry; leave it.
            if let Some((key, entry)) = self.entries.remove_if(&key, |_, e| e.is_expired(now)) {
                debug!(
                    "Expired '{}' from {} after {:?}",
                    key,
                    self.backend.collection,
                    now - entry.inserted_at
                );
                self.backend.spawn_write_back(&self.runtime, key, entry.value);
                evicted += 1;
            }
        }
        evicted
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        self.stop.notify_one();
    }
}

/// Write-back cache for the documents of one collection.
///
/// Cloning is cheap and shares the same entries and sweeper. Constructed
/// only through [`CacheRegistry::create_or_get`](super::CacheRegistry::create_or_get).
pub struct EntityCache<T> {
    inner: Arc<Inner<T>>,
}

// Manual Clone implementation that doesn't require T: Clone
impl<T> Clone for EntityCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: CachedEntity> EntityCache<T> {
    /// Build a cache and start its sweeper on the current tokio runtime.
    pub(crate) fn new(options: &CacheOptions, store: Arc<dyn DocumentStore>) -> Result<Self, CacheError> {
        options.validate()?;

        let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime {
            collection: options.collection_name.clone(),
        })?;

        let inner = Arc::new(Inner {
            entries: DashMap::new(),
            backend: Backend {
                collection: Arc::from(options.collection_name.as_str()),
                store,
                stats: Arc::new(CacheStats::default()),
            },
            ttl: options.ttl,
            sweep_interval: options.effective_sweep_interval(),
            runtime,
            stop: Arc::new(Notify::new()),
        });

        spawn_sweeper(&inner);

        info!(
            "Entity cache '{}' ready (ttl {:?}, sweep every {:?})",
            options.collection_name, inner.ttl, inner.sweep_interval
        );

        Ok(Self { inner })
    }

    /// Name of the collection this cache fronts.
    pub fn name(&self) -> &str {
        &self.inner.backend.collection
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn sweep_interval(&self) -> Duration {
        self.inner.sweep_interval
    }

    /// Get a value, reading through to the store on a miss.
    ///
    /// Returns `None` when the store has no matching document. Store errors
    /// are logged and also read as `None`.
    pub async fn get(&self, key: &str) -> Option<T> {
        if let Some(value) = self.live_value(key) {
            return Some(value);
        }
        self.inner.backend.stats.record_miss();
        self.evict_stale(key).await;

        let value: T = self.inner.backend.fetch(key).await?;
        self.set(key, value.clone());
        Some(value)
    }

    /// Insert or replace a value and re-arm its expiry.
    ///
    /// Nothing is written to the store until the entry leaves memory.
    pub fn set(&self, key: impl Into<String>, value: T) -> bool {
        self.inner
            .entries
            .insert(key.into(), CacheEntry::new(value, self.inner.ttl));
        true
    }

    /// Get a value, or produce it with `loader` on a miss and cache it.
    ///
    /// The store is never consulted on this path.
    pub async fn get_or_set<F, Fut>(&self, key: &str, loader: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        if let Some(value) = self.live_value(key) {
            return Some(value);
        }
        self.inner.backend.stats.record_miss();
        self.evict_stale(key).await;

        let value = loader().await?;
        self.set(key, value.clone());
        Some(value)
    }

    /// Fallible form of [`get_or_set`](Self::get_or_set).
    ///
    /// A loader error is returned unchanged and nothing is cached.
    pub async fn try_get_or_set<F, Fut, E>(&self, key: &str, loader: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if let Some(value) = self.live_value(key) {
            return Ok(Some(value));
        }
        self.inner.backend.stats.record_miss();
        self.evict_stale(key).await;

        let Some(value) = loader().await? else {
            return Ok(None);
        };
        self.set(key, value.clone());
        Ok(Some(value))
    }

    /// Remove an entry, scheduling its value for write-back.
    ///
    /// Returns the number of entries removed (0 or 1).
    pub fn del(&self, key: &str) -> usize {
        match self.inner.entries.remove(key) {
            Some((key, entry)) => {
                debug!("Deleted '{}' from {}", key, self.inner.backend.collection);
                self.inner
                    .backend
                    .spawn_write_back(&self.inner.runtime, key, entry.value);
                1
            }
            None => 0,
        }
    }

    /// Drop every entry without writing anything back.
    ///
    /// Pending mutations are lost.
    pub fn clear(&self) {
        let dropped = self.inner.entries.len();
        self.inner.entries.clear();
        debug!("Cleared {} entries from {}", dropped, self.inner.backend.collection);
    }

    /// Write every cached value back to the store, keeping the entries.
    ///
    /// Failing keys are logged and counted; the pass always covers every key.
    pub async fn sync_with_database(&self) -> SyncReport {
        let snapshot: Vec<(String, T)> = self
            .inner
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().value.clone()))
            .collect();

        let mut report = SyncReport::default();
        for (key, value) in snapshot {
            if self.inner.backend.write_back(&key, &value).await {
                report.written += 1;
            } else {
                report.failed += 1;
            }
        }

        debug!(
            "Synced {}: {} written, {} failed",
            self.inner.backend.collection, report.written, report.failed
        );
        report
    }

    /// Run one sweep pass now. Returns the number of entries evicted.
    pub fn evict_expired(&self) -> usize {
        self.inner.evict_expired(Instant::now())
    }

    /// Stop the background sweeper. Expired entries are then only evicted on access.
    pub fn stop_sweeper(&self) {
        self.inner.stop.notify_one();
    }

    /// Number of entries held in memory, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Check for a live entry without touching the store.
    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    /// Keys currently held in memory.
    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.inner.backend.stats.snapshot()
    }

    fn live_value(&self, key: &str) -> Option<T> {
        let entry = self.inner.entries.get(key)?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        self.inner.backend.stats.record_hit();
        Some(entry.value.clone())
    }

    /// Evict an expired, not yet swept entry. The write-back is awaited so a
    /// following read-through sees it.
    async fn evict_stale(&self, key: &str) {
        let now = Instant::now();
        let Some((key, entry)) = self.inner.entries.remove_if(key, |_, e| e.is_expired(now)) else {
            return;
        };
        debug!("Expired '{}' from {} on access", key, self.inner.backend.collection);
        self.inner.backend.write_back(&key, &entry.value).await;
    }
}

fn spawn_sweeper<T: CachedEntity>(inner: &Arc<Inner<T>>) {
    let weak: Weak<Inner<T>> = Arc::downgrade(inner);
    let stop = Arc::clone(&inner.stop);
    let period = inner.sweep_interval;
    let name = Arc::clone(&inner.backend.collection);

    inner.runtime.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.notified() => break,
                _ = ticker.tick() => {
                    let Some(inner) = weak.upgrade() else { break };
                    let evicted = inner.evict_expired(Instant::now());
                    if evicted > 0 {
                        debug!("Sweeper evicted {} entries from {}", evicted, name);
                    }
                }
            }
        }

        debug!("Sweeper for {} stopped", name);
    });
}

impl<T> std::fmt::Debug for EntityCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("collection", &self.inner.backend.collection)
            .field("ttl", &self.inner.ttl)
            .field("entry_count", &self.inner.entries.len())
            .finish()
    }
}
