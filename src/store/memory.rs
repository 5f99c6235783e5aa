//! In-memory document store.
//!
//! Understands exactly the filter shapes the cache produces: field
//! equality and a top-level `$or` of equality filters. Every call is
//! counted or recorded so tests can assert on store traffic.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};
use parking_lot::RwLock;

use super::{DocumentStore, StoreError};

/// One `upsert_one` call as the store received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedUpsert {
    pub collection: String,
    pub filter: Document,
    pub document: Document,
}

/// [`DocumentStore`] that keeps every collection in process memory.
///
/// Cloning is cheap and shares the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, Vec<Document>>>>,
    upserts: Arc<RwLock<Vec<RecordedUpsert>>>,
    fetches: Arc<AtomicU64>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a document straight into a collection, bypassing call recording.
    pub fn insert(&self, collection: &str, document: Document) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    /// Look up a document without counting it as a fetch.
    pub fn find(&self, collection: &str, filter: &Document) -> Option<Document> {
        self.collections
            .read()
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| matches(d, filter)).cloned())
    }

    /// Number of documents stored in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Number of `fetch_one` calls received, including failed ones.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Every `upsert_one` call received, in arrival order, including failed ones.
    pub fn upserts(&self) -> Vec<RecordedUpsert> {
        self.upserts.read().clone()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StoreError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        Ok(self.find(collection, &filter))
    }

    async fn upsert_one(
        &self,
        collection: &str,
        filter: Document,
        document: Document,
    ) -> Result<(), StoreError> {
        self.upserts.write().push(RecordedUpsert {
            collection: collection.to_string(),
            filter: filter.clone(),
            document: document.clone(),
        });
        self.check_available()?;

        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();

        if let Some(existing) = docs.iter_mut().find(|d| matches(d, &filter)) {
            for (field, value) in document {
                existing.insert(field, value);
            }
            return Ok(());
        }

        // Upsert insert: equality fields of the filter, then the update body.
        let mut created = Document::new();
        for (field, value) in filter.iter().filter(|(k, _)| !k.starts_with('$')) {
            created.insert(field.clone(), value.clone());
        }
        for (field, value) in document {
            created.insert(field, value);
        }
        if !created.contains_key("_id") {
            created.insert("_id", ObjectId::new());
        }
        docs.push(created);
        Ok(())
    }
}

fn matches(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(field, expected)| {
        if field == "$or" {
            return match expected {
                Bson::Array(branches) => branches.iter().any(|branch| match branch {
                    Bson::Document(branch) => matches(document, branch),
                    _ => false,
                }),
                _ => false,
            };
        }
        document.get(field) == Some(expected)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[tokio::test]
    async fn test_or_filter_matches_either_field() {
        let store = MemoryStore::new();
        store.insert("users", doc! { "id": "alice", "name": "Alice" });
        store.insert("users", doc! { "_id": "bob", "name": "Bob" });

        let filter = |key: &str| doc! { "$or": [{ "_id": key }, { "id": key }] };

        let alice = store.fetch_one("users", filter("alice")).await.unwrap();
        let bob = store.fetch_one("users", filter("bob")).await.unwrap();
        let carol = store.fetch_one("users", filter("carol")).await.unwrap();

        assert_eq!(alice.unwrap().get_str("name").unwrap(), "Alice");
        assert_eq!(bob.unwrap().get_str("name").unwrap(), "Bob");
        assert!(carol.is_none());
        assert_eq!(store.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_upsert_merges_existing_fields() {
        let store = MemoryStore::new();
        store.insert("users", doc! { "id": "alice", "name": "Alice", "age": 30 });

        store
            .upsert_one("users", doc! { "id": "alice" }, doc! { "name": "Alicia", "id": "alice" })
            .await
            .unwrap();

        let stored = store.find("users", &doc! { "id": "alice" }).unwrap();
        assert_eq!(stored.get_str("name").unwrap(), "Alicia");
        assert_eq!(stored.get_i32("age").unwrap(), 30);
        assert_eq!(store.count("users"), 1);
    }

    #[tokio::test]
    async fn test_upsert_inserts_with_filter_fields_and_generated_id() {
        let store = MemoryStore::new();

        store
            .upsert_one("users", doc! { "id": "dave" }, doc! { "name": "Dave" })
            .await
            .unwrap();

        let stored = store.find("users", &doc! { "id": "dave" }).unwrap();
        assert_eq!(stored.get_str("name").unwrap(), "Dave");
        assert!(stored.get_object_id("_id").is_ok());
        assert_eq!(store.upserts().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_but_records_calls() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        let fetched = store.fetch_one("users", doc! { "id": "x" }).await;
        let upserted = store
            .upsert_one("users", doc! { "id": "x" }, doc! { "id": "x" })
            .await;

        assert!(matches!(fetched, Err(StoreError::Unavailable(_))));
        assert!(matches!(upserted, Err(StoreError::Unavailable(_))));
        assert_eq!(store.fetch_count(), 1);
        assert_eq!(store.upserts().len(), 1);
        assert_eq!(store.count("users"), 0);
    }
}
