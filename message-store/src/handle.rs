//! Storage handle: owns the SQLite pool lifecycle for the message store.
//!
//! The pool is opened and the schema created on first use; [`StorageHandle::close`]
//! tears it down and every later access reports [`StorageError::StoreClosed`].

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{Result, StorageError};

/// Lazily opened SQLite pool plus a closed flag.
pub struct StorageHandle {
    config: StoreConfig,
    pool: OnceCell<SqlitePool>,
    closed: AtomicBool,
}

impl StorageHandle {
    /// Creates an unopened handle. Nothing touches the database until first use.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            pool: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Pool for statements that modify the database.
    pub async fn writable(&self) -> Result<&SqlitePool> {
        self.open().await
    }

    /// Pool for queries. SQLite shares one pool for both; WAL lets readers run beside a writer.
    pub async fn readable(&self) -> Result<&SqlitePool> {
        self.open().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether the pool has been opened yet.
    pub fn is_open(&self) -> bool {
        self.pool.initialized() && !self.is_closed()
    }

    /// Marks the handle closed and closes the pool if it was ever opened.
    /// Idempotent; waits for checked-out connections to be returned.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
        info!(database_url = %self.config.database_url, "Message store closed");
    }

    async fn open(&self) -> Result<&SqlitePool> {
        if self.is_closed() {
            return Err(StorageError::StoreClosed);
        }
        let pool = self
            .pool
            .get_or_try_init(|| Self::connect(&self.config))
            .await?;
        // close() may have run while the pool was being created
        if self.is_closed() {
            pool.close().await;
            return Err(StorageError::StoreClosed);
        }
        Ok(pool)
    }

    async fn connect(config: &StoreConfig) -> Result<SqlitePool> {
        info!(database_url = %config.database_url, "Opening message store");

        let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);

        let pool = if config.is_in_memory() {
            // An in-memory database lives only as long as its connection.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options.journal_mode(SqliteJournalMode::Wal))
                .await?
        };

        Self::init_schema(&pool).await?;
        Ok(pool)
    }

    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        debug!("Creating message tables if not exist");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_uuid TEXT NOT NULL,
                message_body TEXT NOT NULL,
                message_from TEXT,
                messages_date INTEGER NOT NULL,
                message_type TEXT NOT NULL,
                status TEXT NOT NULL,
                delivery_result_code INTEGER,
                delivery_result_message TEXT,
                sent_result_code INTEGER,
                sent_result_message TEXT,
                retries INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_uuid ON messages(message_uuid);
            CREATE INDEX IF NOT EXISTS idx_messages_status ON messages(status);
            CREATE INDEX IF NOT EXISTS idx_messages_type ON messages(message_type);
            CREATE INDEX IF NOT EXISTS idx_messages_date ON messages(messages_date);
            "#,
        )
        .execute(pool)
        .await?;

        debug!("Message tables ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_opens_lazily() {
        let handle = StorageHandle::new(StoreConfig::in_memory());
        assert!(!handle.is_open());

        handle.readable().await.expect("open in-memory store");
        assert!(handle.is_open());
    }

    #[tokio::test]
    async fn test_closed_handle_rejects_access() {
        let handle = StorageHandle::new(StoreConfig::in_memory());
        handle.writable().await.expect("open in-memory store");

        handle.close().await;
        handle.close().await;

        assert!(handle.is_closed());
        assert!(matches!(
            handle.writable().await,
            Err(StorageError::StoreClosed)
        ));
        assert!(matches!(
            handle.readable().await,
            Err(StorageError::StoreClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_before_open_never_connects() {
        let handle = StorageHandle::new(StoreConfig::in_memory());
        handle.close().await;
        assert!(!handle.is_open());
        assert!(handle.readable().await.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_schema_enforces_unique_uuid() {
        let handle = StorageHandle::new(StoreConfig::in_memory());
        let pool = handle.writable().await.unwrap();

        let insert = "INSERT INTO messages (message_uuid, message_body, messages_date, message_type, status) \
                      VALUES ('dup', 'b', 1, 'TASK', 'PENDING')";
        sqlx::query(insert).execute(pool).await.unwrap();
        let second = sqlx::query(insert).execute(pool).await;

        assert!(second.is_err());
    }
}
