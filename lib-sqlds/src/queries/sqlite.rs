//! SQLite statements
//!
//! SQLite's `LIKE` is case-insensitive for ASCII, so prefixes are matched
//! with the case-sensitive `GLOB` operator instead. Put relies on
//! `ON CONFLICT DO NOTHING` (SQLite 3.24+) against the unique key column.

use super::{quote_literal, QueryProvider};

/// SQLite dialect for a single key/value table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteQueries {
    table: String,
}

impl SqliteQueries {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into() }
    }
}

impl QueryProvider for SqliteQueries {
    fn delete(&self) -> String {
        format!("DELETE FROM {} WHERE key = ?1", self.table)
    }

    fn exists(&self) -> String {
        format!("SELECT EXISTS(SELECT 1 FROM {} WHERE key = ?1)", self.table)
    }

    fn get(&self) -> String {
        format!("SELECT data FROM {} WHERE key = ?1", self.table)
    }

    fn put(&self) -> String {
        format!(
            "INSERT INTO {} (key, data) VALUES (?1, ?2) ON CONFLICT (key) DO NOTHING",
            self.table
        )
    }

    fn query(&self) -> String {
        format!("SELECT key, data FROM {}", self.table)
    }

    fn prefix(&self, prefix: &str) -> String {
        format!(" WHERE key GLOB '{}*' ORDER BY key", quote_literal(prefix))
    }

    fn limit(&self, limit: usize) -> String {
        format!(" LIMIT {}", limit)
    }

    fn offset(&self, offset: usize) -> String {
        format!(" OFFSET {}", offset)
    }

    fn get_size(&self) -> String {
        format!("SELECT length(data) FROM {} WHERE key = ?1", self.table)
    }

    fn unbounded_limit(&self) -> Option<String> {
        Some(" LIMIT -1".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::compose_query;

    #[test]
    fn test_put_ignores_existing_key() {
        let q = SqliteQueries::new("kv");
        assert_eq!(
            q.put(),
            "INSERT INTO kv (key, data) VALUES (?1, ?2) ON CONFLICT (key) DO NOTHING"
        );
    }

    #[test]
    fn test_offset_without_limit_gets_unbounded_limit() {
        let q = SqliteQueries::new("kv");
        assert_eq!(
            compose_query(&q, Some("a/"), None, Some(2)),
            "SELECT key, data FROM kv WHERE key GLOB 'a/*' ORDER BY key LIMIT -1 OFFSET 2"
        );
        assert_eq!(
            compose_query(&q, Some("a/"), Some(3), Some(2)),
            "SELECT key, data FROM kv WHERE key GLOB 'a/*' ORDER BY key LIMIT 3 OFFSET 2"
        );
    }
}
