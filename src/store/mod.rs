//! Store module - the persistent side of the entity cache.
//!
//! The cache only ever talks to a [`DocumentStore`]: fetch one document by
//! filter, or upsert one document by filter. Everything else about the
//! backing database stays behind this trait.
//!
//! - `MongoStore` - production adapter over a MongoDB database
//! - `MemoryStore` - in-process adapter for tests and database-less runs

mod memory;
mod mongo;

use async_trait::async_trait;
use mongodb::bson::Document;
use thiserror::Error;

pub use memory::{MemoryStore, RecordedUpsert};
pub use mongo::{Database, MongoStore};

/// Errors raised by a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("failed to encode document: {0}")]
    Encode(#[from] mongodb::bson::ser::Error),

    #[error("failed to decode document: {0}")]
    Decode(#[from] mongodb::bson::de::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Minimal key/document store the cache reads through and writes back to.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the first document in `collection` matching `filter`.
    async fn fetch_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StoreError>;

    /// Merge `document` into the document matching `filter`, inserting it
    /// when nothing matches.
    async fn upsert_one(
        &self,
        collection: &str,
        filter: Document,
        document: Document,
    ) -> Result<(), StoreError>;
}
