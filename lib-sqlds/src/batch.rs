//! Transactional batches
//!
//! A [`Batch`] groups puts and deletes into a single backend transaction.
//! The transaction is opened by the first operation, so an unused batch
//! never touches the backend. Every failure rolls the transaction back and
//! closes the batch; committing hands the transaction to the backend.

use futures::FutureExt;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{SqlArg, SqlExecutor, SqlTransaction};
use crate::error::{Result, SqlStoreError};
use crate::key::Key;
use crate::queries::QueryProvider;

enum BatchState<T> {
    /// No operation yet, no transaction
    Idle,
    /// Transaction opened by the first operation
    Open(T),
    /// Rolled back; further operations are rejected
    Closed,
}

/// Atomic group of writes applied within one transaction.
///
/// Dropping a batch without committing discards its writes.
pub struct Batch<E: SqlExecutor, Q: QueryProvider> {
    executor: E,
    queries: Arc<Q>,
    state: BatchState<E::Transaction>,
}

impl<E: SqlExecutor, Q: QueryProvider> Batch<E, Q> {
    pub(crate) fn new(executor: E, queries: Arc<Q>) -> Self {
        Self {
            executor,
            queries,
            state: BatchState::Idle,
        }
    }

    /// Whether a transaction has been opened
    pub fn is_open(&self) -> bool {
        matches!(self.state, BatchState::Open(_))
    }

    /// Whether the batch was rolled back
    pub fn is_closed(&self) -> bool {
        matches!(self.state, BatchState::Closed)
    }

    /// Insert a key/value pair unless the key already exists
    ///
    /// # Errors
    /// - `SqlStoreError::InvalidValue` if `value` is `None`; an open
    ///   transaction is rolled back
    /// - `SqlStoreError::BatchClosed` if the batch was rolled back earlier
    /// - `SqlStoreError::Backend` if the statement fails; the transaction is
    ///   rolled back
    pub async fn put(&mut self, key: &Key, value: Option<&[u8]>) -> Result<()> {
        let Some(value) = value else {
            self.rollback().await;
            return Err(SqlStoreError::InvalidValue);
        };

        let statement = self.queries.put();
        self.run(&statement, &[SqlArg::Text(key.as_str()), SqlArg::Blob(value)])
            .await
    }

    /// Delete a key. Missing keys are not an error.
    pub async fn delete(&mut self, key: &Key) -> Result<()> {
        let statement = self.queries.delete();
        self.run(&statement, &[SqlArg::Text(key.as_str())]).await
    }

    /// Commit the accumulated operations
    ///
    /// A batch without operations commits without touching the backend.
    /// On failure the transaction is rolled back and the error returned.
    pub async fn commit(mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, BatchState::Closed) {
            BatchState::Idle => Ok(()),
            BatchState::Open(tx) => {
                // sqlx rolls the transaction back when a failed commit drops it
                tx.commit().await.map_err(|e| {
                    warn!("Batch commit failed, transaction rolled back: {}", e);
                    SqlStoreError::Backend(e)
                })?;
                debug!("Committed batch on {}", self.executor.backend_type());
                Ok(())
            }
            BatchState::Closed => Err(SqlStoreError::BatchClosed),
        }
    }

    async fn transaction(&mut self) -> Result<&mut E::Transaction> {
        if let BatchState::Idle = self.state {
            let tx = self.executor.begin().await?;
            debug!("Opened batch transaction on {}", self.executor.backend_type());
            self.state = BatchState::Open(tx);
        }

        match &mut self.state {
            BatchState::Open(tx) => Ok(tx),
            _ => Err(SqlStoreError::BatchClosed),
        }
    }

    async fn run(&mut self, statement: &str, args: &[SqlArg<'_>]) -> Result<()> {
        let tx = self.transaction().await?;

        let outcome = AssertUnwindSafe(tx.execute(statement, args))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                self.rollback().await;
                Err(SqlStoreError::Backend(e))
            }
            Err(payload) => {
                self.rollback().await;
                panic::resume_unwind(payload)
            }
        }
    }

    async fn rollback(&mut self) {
        match std::mem::replace(&mut self.state, BatchState::Closed) {
            BatchState::Open(tx) => {
                warn!("Rolling back batch transaction");
                if let Err(e) = tx.rollback().await {
                    warn!("Batch rollback failed: {}", e);
                }
            }
            other => self.state = other,
        }
    }
}

impl<E: SqlExecutor, Q: QueryProvider> Drop for Batch<E, Q> {
    fn drop(&mut self) {
        if self.is_open() {
            debug!("Uncommitted batch dropped, transaction rolled back");
        }
    }
}

impl<E: SqlExecutor, Q: QueryProvider> fmt::Debug for Batch<E, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            BatchState::Idle => "idle",
            BatchState::Open(_) => "open",
            BatchState::Closed => "closed",
        };
        f.debug_struct("Batch")
            .field("backend", &self.executor.backend_type())
            .field("state", &state)
            .finish()
    }
}
