//! Error types for datastore operations

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Datastore errors
///
/// `NotFound` is produced locally from a "no rows" / "zero rows affected"
/// outcome; raw backend errors are never used to signal key absence.
#[derive(Debug, Error)]
pub enum SqlStoreError {
    /// A write was attempted without a value
    #[error("Invalid value: writes require a value")]
    InvalidValue,

    /// The key does not exist
    #[error("Key not found")]
    NotFound,

    /// The backend failed to execute a statement
    #[error("Backend error: {0}")]
    Backend(#[from] sqlx::Error),

    /// A row returned by a query could not be decoded
    #[error("Failed to read row from query: {0}")]
    Scan(#[source] sqlx::Error),

    /// The batch was rolled back and cannot accept further operations
    #[error("Batch is closed: its transaction was rolled back")]
    BatchClosed,

    /// Table identifier rejected at setup
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    /// Configuration could not be loaded or is incomplete
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SqlStoreError {
    /// Whether this error reports a missing key
    pub fn is_not_found(&self) -> bool {
        matches!(self, SqlStoreError::NotFound)
    }
}

/// Result type for datastore operations
pub type Result<T> = std::result::Result<T, SqlStoreError>;
