//! Cache registry - one entity cache per collection.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{CacheError, CacheOptions, CachedEntity, EntityCache, SyncReport};
use crate::store::DocumentStore;

/// Type-erased view of an entity cache, for registry-wide operations.
#[async_trait]
trait ManagedCache: Send + Sync {
    fn clear(&self);
    async fn sync_with_database(&self) -> SyncReport;
    fn stop_sweeper(&self);
    fn entity_type(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<T: CachedEntity> ManagedCache for EntityCache<T> {
    fn clear(&self) {
        EntityCache::clear(self);
    }

    async fn sync_with_database(&self) -> SyncReport {
        EntityCache::sync_with_database(self).await
    }

    fn stop_sweeper(&self) {
        EntityCache::stop_sweeper(self);
    }

    fn entity_type(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Process-wide registry handing out exactly one [`EntityCache`] per collection.
///
/// Build it once at startup and pass clones around; clones share the same
/// caches and store.
///
/// ## Example
///
/// ```rust,ignore
/// let registry = CacheRegistry::new(store);
///
/// let voice = registry.create_or_get::<VoiceData>(CacheOptions::from_secs("voiceData", 3600))?;
/// voice.set(user_id, data);
///
/// // Later, the same instance
/// let voice = registry.get::<VoiceData>("voiceData")?.unwrap();
/// ```
#[derive(Clone)]
pub struct CacheRegistry {
    store: Arc<dyn DocumentStore>,
    caches: Arc<RwLock<HashMap<String, Arc<dyn ManagedCache>>>>,
}

impl CacheRegistry {
    /// Create an empty registry whose caches read from and write to `store`.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        info!("Cache registry initialized");
        Self {
            store,
            caches: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the cache for `options.collection_name`, creating it if needed.
    ///
    /// An existing cache is returned as is; options passed on later calls
    /// are ignored. Must be called inside a tokio runtime, which runs the
    /// sweeper.
    ///
    /// # Errors
    /// - [`CacheError::TypeMismatch`] if the collection is cached with another entity type
    /// - [`CacheError::InvalidOptions`] / [`CacheError::NoRuntime`] when creating fails
    pub fn create_or_get<T: CachedEntity>(
        &self,
        options: CacheOptions,
    ) -> Result<EntityCache<T>, CacheError> {
        let mut caches = self.caches.write();

        if let Some(existing) = caches.get(&options.collection_name) {
            return downcast(&options.collection_name, existing.as_ref());
        }

        debug!("Creating entity cache: {}", options.collection_name);
        let cache = EntityCache::<T>::new(&options, Arc::clone(&self.store))?;
        caches.insert(options.collection_name, Arc::new(cache.clone()));

        Ok(cache)
    }

    /// Get an existing cache by collection name. Never creates one.
    ///
    /// # Errors
    /// Returns [`CacheError::TypeMismatch`] if the cache holds another entity type.
    pub fn get<T: CachedEntity>(&self, collection_name: &str) -> Result<Option<EntityCache<T>>, CacheError> {
        let caches = self.caches.read();
        caches
            .get(collection_name)
            .map(|cache| downcast(collection_name, cache.as_ref()))
            .transpose()
    }

    /// Drop the entries of every cache. Nothing is written back.
    ///
    /// The caches themselves stay registered.
    pub fn clear_all(&self) {
        for cache in self.snapshot() {
            cache.clear();
        }
        info!("Cleared all entity caches");
    }

    /// Write back every cached value of every cache, keeping the entries.
    pub async fn sync_all(&self) -> SyncReport {
        let caches = self.snapshot();
        let reports = join_all(caches.iter().map(|cache| cache.sync_with_database())).await;

        let mut total = SyncReport::default();
        for report in reports {
            total.merge(report);
        }
        total
    }

    /// Stop every sweeper, then flush every cache to the store.
    ///
    /// Entries stay in memory; callers are expected to exit afterwards.
    pub async fn shutdown(&self) -> SyncReport {
        for cache in self.snapshot() {
            cache.stop_sweeper();
        }

        let report = self.sync_all().await;
        info!(
            "Cache registry shut down: {} written, {} failed",
            report.written, report.failed
        );
        report
    }

    /// Check if a cache exists for the collection.
    pub fn contains(&self, collection_name: &str) -> bool {
        self.caches.read().contains_key(collection_name)
    }

    /// Get the number of registered caches.
    pub fn len(&self) -> usize {
        self.caches.read().len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.caches.read().is_empty()
    }

    /// Get a list of all registered collection names.
    pub fn collection_names(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }

    // Clone the handles out so no lock is held across awaits.
    fn snapshot(&self) -> Vec<Arc<dyn ManagedCache>> {
        self.caches.read().values().cloned().collect()
    }
}

fn downcast<T: CachedEntity>(
    collection_name: &str,
    cache: &dyn ManagedCache,
) -> Result<EntityCache<T>, CacheError> {
    cache
        .as_any()
        .downcast_ref::<EntityCache<T>>()
        .cloned()
        .ok_or_else(|| CacheError::TypeMismatch {
            collection: collection_name.to_string(),
            expected: type_name::<T>(),
            found: cache.entity_type(),
        })
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let caches = self.caches.read();
        f.debug_struct("CacheRegistry")
            .field("cache_count", &caches.len())
            .field("collection_names", &caches.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mongodb::bson::doc;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::store::MemoryStore;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Member {
        name: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Guild {
        title: String,
    }

    fn registry(store: &MemoryStore) -> CacheRegistry {
        CacheRegistry::new(Arc::new(store.clone()))
    }

    fn member(name: &str) -> Member {
        Member { name: name.to_string() }
    }

    #[tokio::test]
    async fn test_create_or_get_is_idempotent() {
        let registry = registry(&MemoryStore::new());

        let first = registry
            .create_or_get::<Member>(CacheOptions::from_secs("members", 60))
            .unwrap();
        let second = registry
            .create_or_get::<Member>(CacheOptions::from_secs("members", 5))
            .unwrap();

        // Later options are ignored.
        assert_eq!(second.ttl(), Duration::from_secs(60));
        first.set("m1", member("Ann"));
        assert!(second.contains("m1"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_get_never_creates() {
        let registry = registry(&MemoryStore::new());

        assert!(registry.get::<Member>("members").unwrap().is_none());
        assert!(registry.is_empty());

        registry
            .create_or_get::<Member>(CacheOptions::from_secs("members", 60))
            .unwrap()
            .set("m1", member("Ann"));

        let cache = registry.get::<Member>("members").unwrap().unwrap();
        assert!(cache.contains("m1"));
        assert!(registry.contains("members"));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_an_error() {
        let registry = registry(&MemoryStore::new());
        registry
            .create_or_get::<Member>(CacheOptions::from_secs("members", 60))
            .unwrap();

        let created = registry.create_or_get::<Guild>(CacheOptions::from_secs("members", 60));
        assert!(matches!(created, Err(CacheError::TypeMismatch { .. })));
        assert!(matches!(
            registry.get::<Guild>("members"),
            Err(CacheError::TypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_options_register_nothing() {
        let registry = registry(&MemoryStore::new());

        let created = registry.create_or_get::<Member>(CacheOptions::from_secs("members", 0));
        assert!(matches!(created, Err(CacheError::InvalidOptions { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_create_outside_runtime_fails() {
        let registry = registry(&MemoryStore::new());
        let created = registry.create_or_get::<Member>(CacheOptions::from_secs("members", 60));
        assert!(matches!(created, Err(CacheError::NoRuntime { .. })));
    }

    #[tokio::test]
    async fn test_clear_all_keeps_caches_and_writes_nothing() {
        let store = MemoryStore::new();
        let registry = registry(&store);

        let members = registry
            .create_or_get::<Member>(CacheOptions::from_secs("members", 60))
            .unwrap();
        let guilds = registry
            .create_or_get::<Guild>(CacheOptions::from_secs("guilds", 60))
            .unwrap();
        members.set("m1", member("Ann"));
        guilds.set("g1", Guild { title: "Hall".into() });

        registry.clear_all();
        tokio::task::yield_now().await;

        assert!(members.is_empty());
        assert!(guilds.is_empty());
        assert_eq!(registry.len(), 2);
        let mut names = registry.collection_names();
        names.sort();
        assert_eq!(names, vec!["guilds".to_string(), "members".to_string()]);
        assert!(store.upserts().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_flushes_every_cache() {
        let store = MemoryStore::new();
        let registry = registry(&store);

        let members = registry
            .create_or_get::<Member>(CacheOptions::from_secs("members", 3600))
            .unwrap();
        let guilds = registry
            .create_or_get::<Guild>(CacheOptions::from_secs("guilds", 3600))
            .unwrap();
        members.set("m1", member("Ann"));
        members.set("m2", member("Bob"));
        guilds.set("g1", Guild { title: "Hall".into() });

        let report = registry.shutdown().await;

        assert_eq!(report, SyncReport { written: 3, failed: 0 });
        assert_eq!(store.count("members"), 2);
        let hall = store.find("guilds", &doc! { "id": "g1" }).unwrap();
        assert_eq!(hall.get_str("title").unwrap(), "Hall");
    }
}
