//! Key/value datastore facade over a relational table
//!
//! [`SqlDatastore`] pairs a statement executor with a dialect's
//! [`QueryProvider`]. Single-key operations map to one statement each;
//! queries push prefix, limit and offset down to the backend where they can
//! and run filters and orders over the fetched rows.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::backend::{SqlArg, SqlExecutor};
use crate::batch::Batch;
use crate::error::{Result, SqlStoreError};
use crate::key::Key;
use crate::queries::{compose_query, QueryProvider};
use crate::query::Query;
use crate::results::{ClientStages, QueryResults};

#[cfg(feature = "postgres")]
use crate::backend::PostgresBackend;
#[cfg(feature = "sqlite")]
use crate::backend::SqliteBackend;
#[cfg(feature = "sqlite")]
use crate::backend::validate_table_name;
#[cfg(feature = "postgres")]
use crate::config::SqlStoreConfig;
#[cfg(feature = "postgres")]
use crate::queries::PostgresQueries;
#[cfg(feature = "sqlite")]
use crate::queries::SqliteQueries;

/// Datastore backed by PostgreSQL
#[cfg(feature = "postgres")]
pub type PostgresDatastore = SqlDatastore<PostgresBackend, PostgresQueries>;

/// Datastore backed by SQLite
#[cfg(feature = "sqlite")]
pub type SqliteDatastore = SqlDatastore<SqliteBackend, SqliteQueries>;

/// Key/value store over one table.
///
/// Cloning is cheap: clones share the connection pool and statements.
pub struct SqlDatastore<E: SqlExecutor, Q: QueryProvider> {
    executor: E,
    queries: Arc<Q>,
}

impl<E: SqlExecutor, Q: QueryProvider> Clone for SqlDatastore<E, Q> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            queries: Arc::clone(&self.queries),
        }
    }
}

impl<E: SqlExecutor, Q: QueryProvider> fmt::Debug for SqlDatastore<E, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlDatastore")
            .field("executor", &self.executor)
            .field("queries", &self.queries)
            .finish()
    }
}

impl<E: SqlExecutor, Q: QueryProvider> SqlDatastore<E, Q> {
    /// Wrap an executor whose table already exists
    pub fn new(executor: E, queries: Q) -> Self {
        Self {
            executor,
            queries: Arc::new(queries),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn queries(&self) -> &Q {
        &self.queries
    }

    /// Store a value unless the key already exists
    ///
    /// A second put to an existing key succeeds and leaves the stored value
    /// unchanged.
    ///
    /// # Errors
    /// - `SqlStoreError::InvalidValue` if `value` is `None`
    /// - `SqlStoreError::Backend` if the statement fails
    pub async fn put(&self, key: &Key, value: Option<&[u8]>) -> Result<()> {
        let value = value.ok_or(SqlStoreError::InvalidValue)?;

        self.executor
            .execute(
                &self.queries.put(),
                &[SqlArg::Text(key.as_str()), SqlArg::Blob(value)],
            )
            .await?;
        Ok(())
    }

    /// Retrieve the value stored for a key
    pub async fn get(&self, key: &Key) -> Result<Vec<u8>> {
        self.executor
            .fetch_bytes(&self.queries.get(), key.as_str())
            .await?
            .ok_or(SqlStoreError::NotFound)
    }

    /// Whether a value is stored for a key
    pub async fn has(&self, key: &Key) -> Result<bool> {
        let exists = self
            .executor
            .fetch_flag(&self.queries.exists(), key.as_str())
            .await?;
        Ok(exists.unwrap_or(false))
    }

    /// Remove a key
    ///
    /// # Errors
    /// - `SqlStoreError::NotFound` if no row was deleted
    /// - `SqlStoreError::Backend` if the statement fails
    pub async fn delete(&self, key: &Key) -> Result<()> {
        let affected = self
            .executor
            .execute(&self.queries.delete(), &[SqlArg::Text(key.as_str())])
            .await?;

        if affected == 0 {
            return Err(SqlStoreError::NotFound);
        }
        Ok(())
    }

    /// Byte length of the value stored for a key
    ///
    /// # Errors
    /// - `SqlStoreError::NotFound` if the key is absent
    /// - `SqlStoreError::Backend` if the statement fails or reports a
    ///   negative size
    pub async fn get_size(&self, key: &Key) -> Result<usize> {
        let size = self
            .executor
            .fetch_size(&self.queries.get_size(), key.as_str())
            .await?
            .ok_or(SqlStoreError::NotFound)?;

        usize::try_from(size).map_err(|_| {
            SqlStoreError::Backend(sqlx::Error::Decode(
                format!("Invalid value size {} for key {}", size, key).into(),
            ))
        })
    }

    /// Run a query with filters, orders and windowing applied
    ///
    /// Prefix, limit and offset go to the backend when a prefix is set.
    /// Without a prefix the whole table is scanned and limit and offset are
    /// applied after filtering and ordering.
    pub async fn query(&self, query: Query) -> Result<QueryResults> {
        let stages = ClientStages {
            filter: true,
            order: true,
            window: !query.is_pushed_down(),
        };
        self.fetch(query, stages).await
    }

    /// Run only the backend part of a query
    ///
    /// Filters and orders are ignored, as are limit and offset unless a
    /// prefix pushes them down.
    pub async fn raw_query(&self, query: Query) -> Result<QueryResults> {
        self.fetch(query, ClientStages::default()).await
    }

    /// Flush pending writes under a prefix. Every write is already durable
    /// when its statement returns, so there is nothing to do.
    pub async fn sync(&self, _prefix: &Key) -> Result<()> {
        Ok(())
    }

    /// Start an empty batch. No transaction is opened until its first
    /// operation.
    pub fn batch(&self) -> Batch<E, Q> {
        Batch::new(self.executor.clone(), Arc::clone(&self.queries))
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.executor.close().await;
    }

    async fn fetch(&self, query: Query, stages: ClientStages) -> Result<QueryResults> {
        let statement = if query.is_pushed_down() {
            compose_query(
                self.queries.as_ref(),
                query.effective_prefix(),
                query.effective_limit(),
                query.effective_offset(),
            )
        } else {
            self.queries.query()
        };

        debug!("Query on {}: {}", self.executor.backend_type(), statement);

        let rows = self.executor.stream_entries(statement);
        QueryResults::start(query, rows, stages).await
    }
}

#[cfg(feature = "postgres")]
impl SqlDatastore<PostgresBackend, PostgresQueries> {
    /// Connect to PostgreSQL and create the configured table if needed
    pub async fn open_postgres(config: &SqlStoreConfig) -> Result<Self> {
        config.validate()?;

        let backend = PostgresBackend::connect(config).await?;
        backend.create_table(&config.table).await?;

        Ok(Self::new(backend, PostgresQueries::new(&config.table)))
    }
}

#[cfg(feature = "sqlite")]
impl SqlDatastore<SqliteBackend, SqliteQueries> {
    /// Open or create a SQLite database file and its table
    pub async fn open_sqlite(path: impl AsRef<std::path::Path>, table: &str) -> Result<Self> {
        validate_table_name(table)?;

        let backend = SqliteBackend::open(path).await?;
        backend.create_table(table).await?;

        Ok(Self::new(backend, SqliteQueries::new(table)))
    }

    /// Open a private in-memory SQLite database (for testing)
    ///
    /// The database has a single connection: finish or drop batches and
    /// query results before issuing other operations.
    pub async fn open_sqlite_in_memory(table: &str) -> Result<Self> {
        validate_table_name(table)?;

        let backend = SqliteBackend::open_in_memory().await?;
        backend.create_table(table).await?;

        Ok(Self::new(backend, SqliteQueries::new(table)))
    }
}
