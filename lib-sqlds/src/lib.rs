//! Relational Key/Value Datastore
//!
//! Stores opaque byte values under string keys in a single two-column table
//! (`key`, `data`) of a relational database. PostgreSQL and SQLite are
//! supported through dialect-specific statement providers.
//!
//! # Layers
//!
//! - [`queries`]: SQL text per dialect, plus the prefix/limit/offset composer
//! - [`backend`]: sqlx executors and transactions
//! - [`datastore`]: the key/value facade and query pipeline
//! - [`batch`]: atomic groups of writes
//!
//! # Example
//!
//! ```no_run
//! use lib_sqlds::{Key, Query, SqliteDatastore};
//!
//! # async fn run() -> lib_sqlds::Result<()> {
//! let store = SqliteDatastore::open_sqlite("datastore.db", "kv").await?;
//! store.put(&Key::from("/peers/a"), Some(b"record")).await?;
//!
//! let entries = store.query(Query::prefixed("/peers/")).await?.rest().await?;
//! assert_eq!(entries.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod batch;
pub mod config;
pub mod datastore;
pub mod error;
pub mod key;
pub mod queries;
pub mod query;
pub mod results;

pub use backend::{SqlArg, SqlExecutor, SqlTransaction};
pub use batch::Batch;
pub use config::{load_config, SqlStoreConfig};
pub use datastore::SqlDatastore;
pub use error::{Result, SqlStoreError};
pub use key::Key;
pub use queries::{compose_query, QueryProvider};
pub use query::{Entry, Filter, Op, Order, Query};
pub use results::QueryResults;

#[cfg(feature = "postgres")]
pub use datastore::PostgresDatastore;
#[cfg(feature = "sqlite")]
pub use datastore::SqliteDatastore;
