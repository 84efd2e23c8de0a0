//! SQLite executor
//!
//! # Features
//!
//! - WAL mode for concurrent readers alongside a writer
//! - Creates the database file if it doesn't exist
//! - In-memory databases for tests (single pinned connection)

use async_trait::async_trait;
use futures::StreamExt;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{validate_table_name, SqlArg, SqlExecutor, SqlTransaction, ROW_BUFFER};
use crate::error::{Result, SqlStoreError};
use crate::query::Entry;
use crate::results::RowReceiver;

/// Default pool size for file-backed databases
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// SQLite-backed statement executor
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open or create a SQLite database at the given path
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        info!("Opening SQLite backend at: {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Open an in-memory SQLite database (for testing)
    ///
    /// The database lives on a single connection that is never recycled, so
    /// an open batch or an unfinished query blocks other operations until it
    /// completes.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        debug!("Opened in-memory SQLite backend");
        Ok(Self { pool })
    }

    /// Create the key/value table if it does not exist yet
    pub async fn create_table(&self, table: &str) -> Result<()> {
        validate_table_name(table)?;

        let statement = format!(
            "CREATE TABLE IF NOT EXISTS {} (key TEXT NOT NULL UNIQUE, data BLOB NOT NULL)",
            table
        );
        sqlx::query(&statement).execute(&self.pool).await?;

        info!("SQLite table '{}' ready", table);
        Ok(())
    }
}

fn bind_args<'q>(
    statement: &'q str,
    args: &'q [SqlArg<'q>],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    args.iter()
        .fold(sqlx::query(statement), |query, arg| match *arg {
            SqlArg::Text(text) => query.bind(text),
            SqlArg::Blob(bytes) => query.bind(bytes),
        })
}

fn decode_entry(row: &SqliteRow) -> Result<Entry> {
    let key: String = row.try_get(0).map_err(SqlStoreError::Scan)?;
    let value: Vec<u8> = row.try_get(1).map_err(SqlStoreError::Scan)?;
    Ok(Entry::new(key, value))
}

#[async_trait]
impl SqlExecutor for SqliteBackend {
    type Transaction = SqliteTransaction;

    fn backend_type(&self) -> &'static str {
        "sqlite"
    }

    async fn execute(&self, statement: &str, args: &[SqlArg<'_>]) -> sqlx::Result<u64> {
        let result = bind_args(statement, args).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_bytes(&self, statement: &str, key: &str) -> sqlx::Result<Option<Vec<u8>>> {
        sqlx::query_scalar(statement)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
    }

    async fn fetch_flag(&self, statement: &str, key: &str) -> sqlx::Result<Option<bool>> {
        // EXISTS yields an INTEGER in SQLite
        let flag: Option<i64> = sqlx::query_scalar(statement)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(flag.map(|flag| flag != 0))
    }

    async fn fetch_size(&self, statement: &str, key: &str) -> sqlx::Result<Option<i64>> {
        sqlx::query_scalar(statement)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
    }

    fn stream_entries(&self, statement: String) -> RowReceiver {
        let (tx, rx) = mpsc::channel(ROW_BUFFER);
        let pool = self.pool.clone();

        tokio::spawn(async move {
            let mut rows = sqlx::query(&statement).fetch(&pool);
            while let Some(row) = rows.next().await {
                let item = match row {
                    Ok(row) => decode_entry(&row),
                    Err(e) => Err(SqlStoreError::Backend(e)),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() {
                    debug!("Query consumer dropped, releasing SQLite cursor");
                    return;
                }
                if failed {
                    return;
                }
            }
        });

        rx
    }

    async fn begin(&self) -> sqlx::Result<SqliteTransaction> {
        let inner = self.pool.begin().await?;
        Ok(SqliteTransaction { inner })
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("SQLite backend closed");
    }
}

/// Transaction on a pooled SQLite connection
pub struct SqliteTransaction {
    inner: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl SqlTransaction for SqliteTransaction {
    async fn execute(&mut self, statement: &str, args: &[SqlArg<'_>]) -> sqlx::Result<u64> {
        let result = bind_args(statement, args).execute(&mut *self.inner).await?;
        Ok(result.rows_affected())
    }

    async fn commit(self) -> sqlx::Result<()> {
        self.inner.commit().await
    }

    async fn rollback(self) -> sqlx::Result<()> {
        self.inner.rollback().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_backend() -> SqliteBackend {
        let backend = SqliteBackend::open_in_memory().await.unwrap();
        backend.create_table("kv").await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_execute_and_fetch() {
        let backend = create_test_backend().await;

        let affected = backend
            .execute(
                "INSERT INTO kv (key, data) VALUES (?1, ?2)",
                &[SqlArg::Text("k"), SqlArg::Blob(b"value")],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let data = backend
            .fetch_bytes("SELECT data FROM kv WHERE key = ?1", "k")
            .await
            .unwrap();
        assert_eq!(data, Some(b"value".to_vec()));

        let missing = backend
            .fetch_bytes("SELECT data FROM kv WHERE key = ?1", "other")
            .await
            .unwrap();
        assert_eq!(missing, None);

        let size = backend
            .fetch_size("SELECT length(data) FROM kv WHERE key = ?1", "k")
            .await
            .unwrap();
        assert_eq!(size, Some(5));
    }

    #[tokio::test]
    async fn test_fetch_flag() {
        let backend = create_test_backend().await;
        backend
            .execute(
                "INSERT INTO kv (key, data) VALUES (?1, ?2)",
                &[SqlArg::Text("k"), SqlArg::Blob(b"v")],
            )
            .await
            .unwrap();

        let statement = "SELECT EXISTS(SELECT 1 FROM kv WHERE key = ?1)";
        assert_eq!(backend.fetch_flag(statement, "k").await.unwrap(), Some(true));
        assert_eq!(backend.fetch_flag(statement, "x").await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_transaction_rollback_discards_writes() {
        let backend = create_test_backend().await;

        let mut tx = backend.begin().await.unwrap();
        tx.execute(
            "INSERT INTO kv (key, data) VALUES (?1, ?2)",
            &[SqlArg::Text("k"), SqlArg::Blob(b"v")],
        )
        .await
        .unwrap();
        tx.rollback().await.unwrap();

        let data = backend
            .fetch_bytes("SELECT data FROM kv WHERE key = ?1", "k")
            .await
            .unwrap();
        assert!(data.is_none());
    }

    #[tokio::test]
    async fn test_stream_entries() {
        let backend = create_test_backend().await;
        for key in ["a", "b", "c"] {
            backend
                .execute(
                    "INSERT INTO kv (key, data) VALUES (?1, ?2)",
                    &[SqlArg::Text(key), SqlArg::Blob(key.as_bytes())],
                )
                .await
                .unwrap();
        }

        let mut rx = backend.stream_entries("SELECT key, data FROM kv ORDER BY key".to_string());
        let mut keys = Vec::new();
        while let Some(entry) = rx.recv().await {
            keys.push(entry.unwrap().key.into_inner());
        }

        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_stream_entries_reports_scan_error() {
        let backend = create_test_backend().await;
        backend
            .execute(
                "INSERT INTO kv (key, data) VALUES (?1, ?2)",
                &[SqlArg::Text("k"), SqlArg::Blob(b"v")],
            )
            .await
            .unwrap();

        // Second column is an INTEGER, which does not decode as bytes
        let mut rx = backend.stream_entries("SELECT key, 42 FROM kv".to_string());

        assert!(matches!(rx.recv().await, Some(Err(SqlStoreError::Scan(_)))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_create_table_rejects_invalid_name() {
        let backend = SqliteBackend::open_in_memory().await.unwrap();
        let result = backend.create_table("kv; DROP TABLE kv").await;
        assert!(matches!(result, Err(SqlStoreError::InvalidTableName(_))));
    }
}
