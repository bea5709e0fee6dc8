//! Metadata record caching using Moka.
//!
//! Fronts the storage adapter so repeated lookups of the same id do not hit
//! the backend until the entry expires.

use std::time::Duration;

use depot_shared::FileId;
use depot_shared::config::CacheSettings;
use moka::future::Cache;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::FileResult;
use crate::storage::StorageAdapter;
use crate::types::FileMetadata;

/// TTL cache of `id -> FileMetadata`.
///
/// A background task sweeps expired entries on a fixed interval and stops
/// when the cache is dropped. Must be created inside a tokio runtime.
pub struct MetadataCache {
    cache: Cache<FileId, FileMetadata>,
    sweeper: Option<JoinHandle<()>>,
}

impl MetadataCache {
    /// Creates a cache with the given bounds.
    ///
    /// A zero `sweep_every` disables the background sweep; expired entries
    /// are still never returned.
    #[must_use]
    pub fn new(capacity: u64, ttl: Duration, sweep_every: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        let sweeper = (!sweep_every.is_zero()).then(|| {
            let cache = cache.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(sweep_every);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    cache.run_pending_tasks().await;
                }
            })
        });

        Self { cache, sweeper }
    }

    /// Creates a cache from configuration.
    #[must_use]
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(
            settings.metadata_capacity,
            Duration::from_secs(settings.metadata_ttl_secs),
            Duration::from_secs(settings.metadata_sweep_secs),
        )
    }

    /// Returns cached metadata, fetching it from `adapter` on a miss.
    ///
    /// Errors are not cached.
    pub async fn get_or_fetch(
        &self,
        id: FileId,
        adapter: &dyn StorageAdapter,
    ) -> FileResult<FileMetadata> {
        if let Some(meta) = self.cache.get(&id).await {
            debug!(file_id = %id, "metadata cache hit");
            return Ok(meta);
        }

        debug!(file_id = %id, "metadata cache miss");
        let meta = adapter.get_metadata(id).await?;
        self.cache.insert(id, meta.clone()).await;
        Ok(meta)
    }

    /// Stores metadata that was just produced by a write.
    pub async fn insert(&self, meta: FileMetadata) {
        self.cache.insert(meta.id, meta).await;
    }

    /// Drops the entry for `id`.
    pub async fn invalidate(&self, id: FileId) {
        self.cache.invalidate(&id).await;
    }

    /// Whether `id` currently has a live entry.
    #[must_use]
    pub fn contains(&self, id: FileId) -> bool {
        self.cache.contains_key(&id)
    }

    /// Runs expiry maintenance now.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Number of entries, including ones not yet swept.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Drop for MetadataCache {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}
