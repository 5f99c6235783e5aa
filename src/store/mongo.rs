//! MongoDB database wrapper and store adapter.

use async_trait::async_trait;
use mongodb::bson::{Document, doc};
use mongodb::options::{ClientOptions, UpdateOptions};
use mongodb::{Client, Collection};
use tracing::{debug, info};

use super::{DocumentStore, StoreError};

/// Database wrapper for MongoDB operations.
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    db: mongodb::Database,
}

impl Database {
    /// Connect to MongoDB with the given URI and database name.
    ///
    /// # Errors
    /// Returns error if the URI is invalid or the server does not answer a ping.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        let options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(options)?;

        // Ping the database to verify connection
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;

        info!("Successfully connected to MongoDB database: {}", db_name);

        let db = client.database(db_name);

        Ok(Self { client, db })
    }

    /// Get a raw document collection from the database.
    pub fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }

    /// Close the underlying client, waiting for in-flight operations.
    pub async fn shutdown(self) {
        self.client.shutdown().await;
        info!("MongoDB connection closed");
    }
}

/// [`DocumentStore`] backed by MongoDB collections.
#[derive(Debug, Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn fetch_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StoreError> {
        let result = self.db.collection(collection).find_one(filter).await?;
        debug!("DB fetch from {}: found={}", collection, result.is_some());
        Ok(result)
    }

    async fn upsert_one(
        &self,
        collection: &str,
        filter: Document,
        mut document: Document,
    ) -> Result<(), StoreError> {
        // `_id` is immutable; when the filter already pins it the upsert
        // inserts it from the filter.
        if filter.contains_key("_id") {
            document.remove("_id");
        }

        // MongoDB rejects an empty `$set`.
        if document.is_empty() {
            debug!("Nothing to write to {} for {:?}", collection, filter);
            return Ok(());
        }

        let options = UpdateOptions::builder().upsert(true).build();

        self.db
            .collection(collection)
            .update_one(filter, doc! { "$set": document })
            .with_options(options)
            .await?;

        debug!("DB upsert into {}", collection);
        Ok(())
    }
}
