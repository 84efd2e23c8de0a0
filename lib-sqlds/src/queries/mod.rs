//! Dialect-specific SQL statements
//!
//! A [`QueryProvider`] produces the SQL text for every statement the
//! datastore issues against one table. It performs no I/O and holds no
//! mutable state, so a single provider is shared by the datastore and all
//! of its batches.
//!
//! # Implementations
//!
//! - `PostgresQueries`: `$n` placeholders, `LIKE` prefix matching
//! - `SqliteQueries`: `?n` placeholders, `GLOB` prefix matching

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::PostgresQueries;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteQueries;

use std::fmt;

/// SQL statement provider for one table and dialect.
///
/// Statements taking caller values use positional placeholders: the key is
/// always the first parameter and the value (for `put`) the second. The
/// prefix, limit and offset clauses embed their argument directly and are
/// appended to [`QueryProvider::query`] by [`compose_query`].
pub trait QueryProvider: Send + Sync + fmt::Debug {
    /// Delete the row for a key.
    fn delete(&self) -> String;

    /// Single boolean column: whether a row exists for a key.
    fn exists(&self) -> String;

    /// Single `data` column for a key.
    fn get(&self) -> String;

    /// Insert a key/value pair unless the key already exists.
    ///
    /// The statement must resolve a concurrent insert of the same key as a
    /// no-op rather than a constraint violation.
    fn put(&self) -> String;

    /// Select `key, data` for every row.
    fn query(&self) -> String;

    /// Clause restricting the base query to keys starting with `prefix`,
    /// ordered by key.
    fn prefix(&self, prefix: &str) -> String;

    /// Clause limiting the number of returned rows.
    fn limit(&self, limit: usize) -> String;

    /// Clause skipping the first `offset` rows.
    fn offset(&self, offset: usize) -> String;

    /// Single integer column: byte length of the value for a key.
    fn get_size(&self) -> String;

    /// Clause placed before an offset when no limit was requested, for
    /// dialects where `OFFSET` is only valid after `LIMIT`.
    fn unbounded_limit(&self) -> Option<String> {
        None
    }
}

/// Build a select statement with prefix, limit and offset pushed down.
///
/// Clauses are appended in a fixed order: prefix (when non-empty), limit
/// (when non-zero), offset (when non-zero). The prefix narrows the rows
/// before limit and offset select a window over them.
pub fn compose_query<Q: QueryProvider + ?Sized>(
    queries: &Q,
    prefix: Option<&str>,
    limit: Option<usize>,
    offset: Option<usize>,
) -> String {
    let mut statement = queries.query();

    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        statement.push_str(&queries.prefix(prefix));
    }

    let limit = limit.filter(|l| *l > 0);
    let offset = offset.filter(|o| *o > 0);

    match limit {
        Some(limit) => statement.push_str(&queries.limit(limit)),
        None if offset.is_some() => {
            if let Some(unbounded) = queries.unbounded_limit() {
                statement.push_str(&unbounded);
            }
        }
        None => {}
    }

    if let Some(offset) = offset {
        statement.push_str(&queries.offset(offset));
    }

    statement
}

/// Make `value` safe to embed between single quotes.
///
/// Only quotes are doubled; pattern wildcards pass through unchanged.
pub(crate) fn quote_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct PlainQueries;

    impl QueryProvider for PlainQueries {
        fn delete(&self) -> String {
            "DELETE".into()
        }
        fn exists(&self) -> String {
            "EXISTS".into()
        }
        fn get(&self) -> String {
            "GET".into()
        }
        fn put(&self) -> String {
            "PUT".into()
        }
        fn query(&self) -> String {
            "SELECT".into()
        }
        fn prefix(&self, prefix: &str) -> String {
            format!(" P[{}]", prefix)
        }
        fn limit(&self, limit: usize) -> String {
            format!(" L[{}]", limit)
        }
        fn offset(&self, offset: usize) -> String {
            format!(" O[{}]", offset)
        }
        fn get_size(&self) -> String {
            "SIZE".into()
        }
    }

    #[test]
    fn test_compose_appends_in_fixed_order() {
        let statement = compose_query(&PlainQueries, Some("a/"), Some(3), Some(2));
        assert_eq!(statement, "SELECT P[a/] L[3] O[2]");
    }

    #[test]
    fn test_compose_skips_empty_and_zero_parts() {
        assert_eq!(compose_query(&PlainQueries, None, None, None), "SELECT");
        assert_eq!(compose_query(&PlainQueries, Some(""), Some(0), Some(0)), "SELECT");
        assert_eq!(compose_query(&PlainQueries, Some("x"), None, None), "SELECT P[x]");
        assert_eq!(compose_query(&PlainQueries, None, Some(5), None), "SELECT L[5]");
    }

    #[test]
    fn test_compose_offset_without_limit_uses_default_hook() {
        assert_eq!(compose_query(&PlainQueries, Some("x"), None, Some(4)), "SELECT P[x] O[4]");
    }

    #[test]
    fn test_quote_literal_keeps_wildcards() {
        assert_eq!(quote_literal("it's"), "it''s");
        assert_eq!(quote_literal("50%_*"), "50%_*");
    }
}
