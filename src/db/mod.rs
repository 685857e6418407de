//! SQLite-backed storage.
//!
//! Async access via SQLx: the books catalog plus the pragma-based stats
//! sampling used by the ops endpoints.

pub mod books;

pub use books::{Book, BookRepository};

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Errors surfaced by the storage layer.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("query failed: {0}")]
    Sqlx(sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(sqlx::migrate::MigrateError),
}

/// Size and shape gauges sampled from SQLite pragmas.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatabaseStats {
    pub size_bytes: u64,
    pub page_count: u64,
    pub table_count: u64,
    pub index_count: u64,
    /// Mean latency of the probe queries themselves.
    pub avg_query_ms: f64,
}

/// Shared handle on the connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Upper bound on waiting for a pooled connection.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Idle connections are closed after this long.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open (or create) the database and bring the schema up to date.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let pool = if path == ":memory:" {
            // Shared-cache memory databases are addressed by name; a unique
            // name per call keeps parallel tests from sharing state.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:shelfd-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            // The configured path may point into a directory that does not
            // exist yet.
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                warn!(path = %parent.display(), error = %e, "Could not create database parent directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Database open");

        Self::run_migrations(&pool).await?;

        // WAL keeps readers unblocked while a write is in flight
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;

        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

        // NORMAL syncs at checkpoint rather than per transaction
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(DbError::Migration)?;

        info!("Database migrations applied");
        Ok(())
    }

    /// Get book repository.
    pub fn books(&self) -> BookRepository<'_> {
        BookRepository::new(&self.pool)
    }

    /// Sample the stats gauges. A sampling failure is not worth failing a
    /// metrics request over: it degrades to zeros with a warning.
    pub async fn sample_stats(&self) -> DatabaseStats {
        match self.try_sample_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Database stats sampling failed, reporting zeros: {}", e);
                DatabaseStats::default()
            }
        }
    }

    async fn try_sample_stats(&self) -> Result<DatabaseStats, DbError> {
        let started = Instant::now();
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;
        let table_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
                .fetch_one(&self.pool)
                .await?;
        let index_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'index'")
                .fetch_one(&self.pool)
                .await?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(DatabaseStats {
            size_bytes: page_count.max(0) as u64 * page_size.max(0) as u64,
            page_count: page_count.max(0) as u64,
            table_count: table_count.max(0) as u64,
            index_count: index_count.max(0) as u64,
            avg_query_ms: elapsed_ms / 4.0,
        })
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::Sqlx(err)
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_databases_are_isolated() {
        let a = Database::new(":memory:").await.unwrap();
        let b = Database::new(":memory:").await.unwrap();
        a.books().create("Only in A", "Nobody", None, None).await.unwrap();
        assert_eq!(a.books().list().await.unwrap().len(), 1);
        assert!(b.books().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_reflect_the_migrated_schema() {
        let db = Database::new(":memory:").await.unwrap();
        let stats = db.sample_stats().await;
        assert!(stats.page_count > 0);
        assert!(stats.size_bytes >= stats.page_count);
        // books plus the sqlx migrations bookkeeping table.
        assert!(stats.table_count >= 2);
        assert!(stats.avg_query_ms >= 0.0);
    }

    #[tokio::test]
    async fn closed_pool_degrades_stats_to_zeros() {
        let db = Database::new(":memory:").await.unwrap();
        db.pool().close().await;
        // Sampling failures must never surface through a metrics request.
        assert_eq!(db.sample_stats().await, DatabaseStats::default());
    }

    #[tokio::test]
    async fn file_backed_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/catalog.db");
        let path = path.to_str().unwrap();

        {
            let db = Database::new(path).await.unwrap();
            db.books()
                .create("Persisted", "On Disk", None, Some(2001))
                .await
                .unwrap();
            db.pool().close().await;
        }

        let db = Database::new(path).await.unwrap();
        let books = db.books().list().await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Persisted");
    }
}
