use async_trait::async_trait;
use postino_core::MessageSummary;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;

use crate::config::CacheConfig;

pub mod memory;
pub mod redis_cache;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend: {0}")]
    Backend(#[from] redis::RedisError),
    #[error("cache entry encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Per-recipient window of at most `capacity` summaries, newest first.
/// Never authoritative: an empty, expired or partial window only costs a
/// trip to the message store.
#[async_trait]
pub trait RecencyCache: Send + Sync {
    /// Inserts `summary` into the recipient's window and trims it back to
    /// capacity, as one atomic step. The oldest entries are the ones dropped.
    async fn push(&self, recipient_id: &str, summary: MessageSummary) -> Result<(), CacheError>;

    /// Whole window, newest first. Refreshes the entry's TTL.
    async fn read(&self, recipient_id: &str) -> Result<Vec<MessageSummary>, CacheError>;

    /// Whether the cached window alone can answer a read from `min_timestamp`.
    /// Goes through [`RecencyCache::read`], so it refreshes the TTL too.
    async fn is_sufficient(
        &self,
        recipient_id: &str,
        min_timestamp: OffsetDateTime,
    ) -> Result<bool, CacheError> {
        let window = self.read(recipient_id).await?;
        Ok(window_covers(&window, min_timestamp))
    }

    /// Backend reachability probe.
    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// True iff the window is non-empty and its oldest entry is not newer than
/// `min_timestamp`. An empty or too-recent window can't tell "never filled"
/// apart from "evicted", so it never counts as covering.
pub fn window_covers(window: &[MessageSummary], min_timestamp: OffsetDateTime) -> bool {
    window
        .last()
        .is_some_and(|oldest| oldest.timestamp <= min_timestamp)
}

/// Leading run of a newest-first window with `timestamp >= min_timestamp`.
pub fn newer_than(window: Vec<MessageSummary>, min_timestamp: OffsetDateTime) -> Vec<MessageSummary> {
    window
        .into_iter()
        .take_while(|s| s.timestamp >= min_timestamp)
        .collect()
}

/// Builds the backend selected by the configuration. The in-memory backend
/// gets its expiry sweep started here, so this must run inside the runtime.
pub async fn connect(config: &CacheConfig) -> Result<Arc<dyn RecencyCache>, CacheError> {
    match &config.url {
        Some(url) => {
            let cache = RedisCache::connect(url, config.capacity, config.ttl).await?;
            tracing::info!(%url, capacity = config.capacity, "using redis recency cache");
            Ok(Arc::new(cache))
        }
        None => {
            tracing::info!(capacity = config.capacity, "using in-memory recency cache");
            let cache = Arc::new(MemoryCache::new(config.capacity, config.ttl));
            cache.spawn_purger();
            Ok(cache)
        }
    }
}
