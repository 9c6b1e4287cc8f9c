#![allow(dead_code)]

use async_trait::async_trait;
use postino_core::MessageSummary;
use postino_server::cache::{CacheError, MemoryCache, RecencyCache};
use postino_server::directory::Directory;
use postino_server::ServiceError;
use postino_server::{connect_pool, run_migrations, sqlite_url_for_path};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Fresh migrated database in a temporary directory. Keep the `TempDir`
/// alive for as long as the pool is used.
pub async fn fresh_pool() -> anyhow::Result<(TempDir, SqlitePool)> {
    let td = TempDir::new()?;
    let url = sqlite_url_for_path(&td.path().join("postino.db"))?;
    let pool = connect_pool(&url).await?;
    run_migrations(&pool).await?;
    Ok((td, pool))
}

pub fn memory_cache() -> Arc<MemoryCache> {
    Arc::new(MemoryCache::new(20, Duration::from_secs(3600)))
}

/// Wraps a memory cache and records every push.
#[derive(Default)]
pub struct RecordingCache {
    inner: Option<MemoryCache>,
    pub pushes: Mutex<Vec<(String, String)>>,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self {
            inner: Some(MemoryCache::new(20, Duration::from_secs(3600))),
            pushes: Mutex::new(Vec::new()),
        }
    }

    pub fn pushes_for(&self, recipient: &str) -> usize {
        self.pushes
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == recipient)
            .count()
    }
}

#[async_trait]
impl RecencyCache for RecordingCache {
    async fn push(&self, recipient_id: &str, summary: MessageSummary) -> Result<(), CacheError> {
        self.pushes
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), summary.message_id.clone()));
        match &self.inner {
            Some(inner) => inner.push(recipient_id, summary).await,
            None => Ok(()),
        }
    }

    async fn read(&self, recipient_id: &str) -> Result<Vec<MessageSummary>, CacheError> {
        match &self.inner {
            Some(inner) => inner.read(recipient_id).await,
            None => Ok(Vec::new()),
        }
    }
}

/// Backend that is always down.
pub struct FailingCache;

#[async_trait]
impl RecencyCache for FailingCache {
    async fn push(&self, _recipient_id: &str, _summary: MessageSummary) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn read(&self, _recipient_id: &str) -> Result<Vec<MessageSummary>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

/// Directory whose database is gone: every lookup fails.
pub struct FailingDirectory;

#[async_trait]
impl Directory for FailingDirectory {
    async fn list_group_members(&self, _group_id: &str) -> Result<Vec<String>, ServiceError> {
        Err(ServiceError::Database(sqlx::Error::PoolClosed))
    }

    async fn is_blocked(&self, _blocker_id: &str, _blocked_id: &str) -> Result<bool, ServiceError> {
        Err(ServiceError::Database(sqlx::Error::PoolClosed))
    }
}
