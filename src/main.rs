//! Strata - write-back entity cache service.
//!
//! Boots the cache registry in front of MongoDB (or an in-memory store when
//! no `MONGODB_URI` is configured), checkpoints every cache periodically and
//! flushes everything on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strata::cache::CacheRegistry;
use strata::config::Config;
use strata::models::{VOICE_COLLECTION, VoiceData};
use strata::store::{Database, DocumentStore, MemoryStore, MongoStore};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("strata=info,mongodb=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    info!("Starting Strata...");

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");

    let (store, database): (Arc<dyn DocumentStore>, Option<Database>) = match &config.mongodb_uri {
        Some(uri) => {
            info!("Connecting to MongoDB...");
            let db = Database::connect(uri, &config.mongodb_database).await?;
            let store: Arc<dyn DocumentStore> = Arc::new(MongoStore::new(db.clone()));
            (store, Some(db))
        }
        None => {
            warn!("MONGODB_URI not set, using in-memory store (nothing survives restart)");
            let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
            (store, None)
        }
    };

    // One registry for the whole process, handed to every consumer.
    let registry = CacheRegistry::new(store);

    let voice = registry.create_or_get::<VoiceData>(config.cache.options_for(VOICE_COLLECTION))?;
    info!("Voice cache ready: {:?}", voice);

    let checkpoint = config
        .cache
        .sync_interval
        .map(|period| tokio::spawn(run_checkpoints(registry.clone(), period)));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    if let Some(task) = checkpoint {
        task.abort();
    }

    let report = registry.shutdown().await;
    if report.failed > 0 {
        warn!("{} cached values could not be written back", report.failed);
    }

    if let Some(db) = database {
        db.shutdown().await;
    }

    info!("Strata stopped");
    Ok(())
}

/// Periodic durability checkpoint, independent of expiry.
async fn run_checkpoints(registry: CacheRegistry, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        ticker.tick().await;
        let report = registry.sync_all().await;
        info!(
            "Checkpoint: {} written, {} failed across {} caches",
            report.written,
            report.failed,
            registry.len()
        );
    }
}
