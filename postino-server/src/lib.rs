use anyhow::Context;
use axum::http::StatusCode;
use postino_core::Limits;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

pub mod cache;
pub mod config;
pub mod controllers;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod read;
pub mod routes;
pub mod store;

use cache::RecencyCache;
use config::ServerConfig;
use directory::SqliteDirectory;
use dispatch::Dispatcher;
use read::ReadCoordinator;
use store::SqliteStore;

pub use error::{ErrorKind, ServiceError};

/// Shared by every handler.
pub struct AppState {
    pub pool: SqlitePool,
    pub directory: Arc<SqliteDirectory>,
    pub cache: Arc<dyn RecencyCache>,
    pub dispatcher: Dispatcher,
    pub reader: ReadCoordinator,
    pub limits: Limits,
}

impl AppState {
    /// Wires store, directory and cache together around an initialized pool.
    pub fn new(pool: SqlitePool, cache: Arc<dyn RecencyCache>, config: &ServerConfig) -> Self {
        let store = Arc::new(SqliteStore::new(pool.clone()));
        let directory = Arc::new(SqliteDirectory::new(pool.clone()));
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::clone(&cache),
            directory.clone(),
            config.fanout,
            config.limits,
        );
        let reader = ReadCoordinator::new(store, Arc::clone(&cache));
        Self {
            pool,
            directory,
            cache,
            dispatcher,
            reader,
            limits: config.limits,
        }
    }
}

// Dato un percorso di file, restituisce un URL SQLite valido. Crea le directory
// genitrici e il file stesso se non esistono.
pub fn sqlite_url_for_path(p: &Path) -> anyhow::Result<String> {
    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };
    if let Some(parent) = abs.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create parent dirs for {:?}", parent))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&abs)
        .with_context(|| format!("create/open sqlite file {:?}", abs))?;
    let s = abs.to_string_lossy().replace('\\', "/");
    Ok(format!("sqlite:///{}", s))
}

/// Turns the configured DATABASE_URL into a SQLite URL. `sqlite::memory:` is
/// passed through, anything else is treated as a file path.
pub fn build_sqlite_url(raw: &str) -> anyhow::Result<String> {
    if raw == "sqlite::memory:" {
        return Ok(raw.to_string());
    }
    let path_part = raw
        .trim_start_matches("sqlite:///")
        .trim_start_matches("sqlite://");
    sqlite_url_for_path(Path::new(path_part))
}

pub async fn connect_pool(db_url: &str) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePool::connect(db_url)
        .await
        .with_context(|| format!("connect to sqlite via {}", db_url))?;
    Ok(pool)
}

/// Creates tables and indexes. Idempotent, run once at startup.
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let stmts = [
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id    TEXT PRIMARY KEY,
            username   TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );"#,
        r#"
        CREATE TABLE IF NOT EXISTS groups (
            group_id   TEXT PRIMARY KEY,
            name       TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );"#,
        r#"
        CREATE TABLE IF NOT EXISTS group_members (
            group_id  TEXT NOT NULL,
            user_id   TEXT NOT NULL,
            joined_at INTEGER NOT NULL,
            PRIMARY KEY (group_id, user_id)
        );"#,
        r#"
        CREATE INDEX IF NOT EXISTS group_members_by_user ON group_members (user_id);"#,
        r#"
        CREATE TABLE IF NOT EXISTS blocks (
            blocker_id TEXT NOT NULL,
            blocked_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (blocker_id, blocked_id)
        );"#,
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            message_id   TEXT PRIMARY KEY,
            sender_id    TEXT NOT NULL,
            channel_kind INTEGER NOT NULL CHECK (channel_kind IN (0, 1)),
            target_id    TEXT NOT NULL,
            body         TEXT NOT NULL,
            sent_at      INTEGER NOT NULL
        );"#,
        r#"
        CREATE INDEX IF NOT EXISTS messages_by_target ON messages (channel_kind, target_id, sent_at);"#,
    ];
    // applica ogni statement di migrazione
    for s in &stmts {
        sqlx::query(s)
            .execute(pool)
            .await
            .with_context(|| format!("apply migration: {}", &s[..s.len().min(60)].replace('\n', " ")))?;
    }
    Ok(())
}

/// Database and cache probe.
pub async fn health_with_pool(pool: &SqlitePool) -> StatusCode {
    // prova ad acquisire una connessione dal pool
    match pool.acquire().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub async fn health(state: &AppState) -> StatusCode {
    let db = health_with_pool(&state.pool).await;
    if !db.is_success() {
        return db;
    }
    match state.cache.ping().await {
        Ok(()) => StatusCode::OK,
        Err(error) => {
            tracing::warn!(%error, "cache probe failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
