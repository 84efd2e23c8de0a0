//! Relational backend executors
//!
//! The datastore never talks to a driver directly. It issues statements
//! produced by a [`QueryProvider`](crate::queries::QueryProvider) through an
//! [`SqlExecutor`], and runs batches inside an [`SqlTransaction`].
//!
//! # Implementations
//!
//! - `SqliteBackend`: sqlx SQLite pool (file or in-memory)
//! - `PostgresBackend`: sqlx PostgreSQL pool

#[cfg(feature = "postgres")]
pub mod postgres_backend;
#[cfg(feature = "sqlite")]
pub mod sqlite_backend;

#[cfg(feature = "postgres")]
pub use postgres_backend::{PostgresBackend, PostgresTransaction};
#[cfg(feature = "sqlite")]
pub use sqlite_backend::{SqliteBackend, SqliteTransaction};

use async_trait::async_trait;
use std::fmt;

use crate::error::{Result, SqlStoreError};
use crate::results::RowReceiver;

/// Number of rows buffered between a query cursor and its consumer
pub const ROW_BUFFER: usize = 64;

/// Maximum table name length (PostgreSQL identifier limit)
pub const MAX_TABLE_NAME_LENGTH: usize = 63;

/// Positional statement argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlArg<'a> {
    Text(&'a str),
    Blob(&'a [u8]),
}

/// Executor for parameterized statements against a connection pool.
///
/// Handles are cheap to clone and share one pool. Errors are the driver's
/// own; translation into datastore errors happens in the caller.
#[async_trait]
pub trait SqlExecutor: Send + Sync + Clone + fmt::Debug + 'static {
    /// Transaction type returned by [`SqlExecutor::begin`].
    type Transaction: SqlTransaction;

    /// Short backend name for logging (e.g. "sqlite")
    fn backend_type(&self) -> &'static str;

    /// Execute a statement, returning the number of affected rows.
    async fn execute(&self, statement: &str, args: &[SqlArg<'_>]) -> sqlx::Result<u64>;

    /// Fetch a single binary column for `key`, `None` when no row matches.
    async fn fetch_bytes(&self, statement: &str, key: &str) -> sqlx::Result<Option<Vec<u8>>>;

    /// Fetch a single boolean column for `key`.
    async fn fetch_flag(&self, statement: &str, key: &str) -> sqlx::Result<Option<bool>>;

    /// Fetch a single integer size column for `key`.
    async fn fetch_size(&self, statement: &str, key: &str) -> sqlx::Result<Option<i64>>;

    /// Run a `key, data` select and stream its rows.
    ///
    /// Rows are produced by a background task holding the cursor. The task
    /// stops after the last row, after the first failing row, or as soon as
    /// the receiver is dropped.
    fn stream_entries(&self, statement: String) -> RowReceiver;

    /// Open a transaction on a pooled connection.
    async fn begin(&self) -> sqlx::Result<Self::Transaction>;

    /// Close the pool, waiting for checked-out connections to return.
    async fn close(&self);
}

/// An open backend transaction.
///
/// Dropping a transaction without committing rolls it back. A failed
/// `commit` leaves the transaction rolled back.
#[async_trait]
pub trait SqlTransaction: Send {
    /// Execute a statement inside the transaction.
    async fn execute(&mut self, statement: &str, args: &[SqlArg<'_>]) -> sqlx::Result<u64>;

    /// Commit all statements executed so far.
    async fn commit(self) -> sqlx::Result<()>;

    /// Discard all statements executed so far.
    async fn rollback(self) -> sqlx::Result<()>;
}

/// Validate a table name before it is embedded in SQL text
pub fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SqlStoreError::InvalidTableName(
            "Table name cannot be empty".to_string(),
        ));
    }
    if name.len() > MAX_TABLE_NAME_LENGTH {
        return Err(SqlStoreError::InvalidTableName(format!(
            "Table name exceeds {} characters",
            MAX_TABLE_NAME_LENGTH
        )));
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(SqlStoreError::InvalidTableName(
            "Table name cannot start with a digit".to_string(),
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SqlStoreError::InvalidTableName(
            "Table name must contain only ASCII letters, digits, or underscores".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("kv").is_ok());
        assert!(validate_table_name("provider_records_2").is_ok());

        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2kv").is_err());
        assert!(validate_table_name("kv; DROP TABLE kv").is_err());
        assert!(validate_table_name("kv-store").is_err());
        assert!(validate_table_name(&"t".repeat(MAX_TABLE_NAME_LENGTH + 1)).is_err());
    }
}
