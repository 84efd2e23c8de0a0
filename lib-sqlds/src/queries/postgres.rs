//! PostgreSQL statements

use super::{quote_literal, QueryProvider};

/// PostgreSQL dialect for a single key/value table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresQueries {
    table: String,
}

impl PostgresQueries {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into() }
    }
}

impl QueryProvider for PostgresQueries {
    fn delete(&self) -> String {
        format!("DELETE FROM {} WHERE key = $1", self.table)
    }

    fn exists(&self) -> String {
        format!("SELECT exists(SELECT 1 FROM {} WHERE key=$1)", self.table)
    }

    fn get(&self) -> String {
        format!("SELECT data FROM {} WHERE key = $1", self.table)
    }

    fn put(&self) -> String {
        format!(
            "INSERT INTO {} (key, data) VALUES ($1, $2) ON CONFLICT (key) DO NOTHING",
            self.table
        )
    }

    fn query(&self) -> String {
        format!("SELECT key, data FROM {}", self.table)
    }

    fn prefix(&self, prefix: &str) -> String {
        format!(" WHERE key LIKE '{}%' ORDER BY key", quote_literal(prefix))
    }

    fn limit(&self, limit: usize) -> String {
        format!(" LIMIT {}", limit)
    }

    fn offset(&self, offset: usize) -> String {
        format!(" OFFSET {}", offset)
    }

    fn get_size(&self) -> String {
        format!("SELECT octet_length(data) FROM {} WHERE key = $1", self.table)
    }
}
