//! Datastore configuration loader and defaults.
//!
//! ```toml
//! host = "db.internal"
//! port = 5432
//! user = "postgres"
//! password = "secret"
//! database = "datastore"
//! table = "providers"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::backend::validate_table_name;
use crate::error::{Result, SqlStoreError};

pub const DEFAULT_HOST: &str = "postgres";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_USER: &str = "postgres";
pub const DEFAULT_DATABASE: &str = "datastore";
pub const DEFAULT_TABLE: &str = "kv";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Connection and table settings for a relational datastore
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SqlStoreConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Required to connect; there is no default
    pub password: Option<String>,
    pub database: String,
    /// Key/value table name
    pub table: String,
    /// Upper bound on pooled connections
    pub max_connections: u32,
}

impl Default for SqlStoreConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: None,
            database: DEFAULT_DATABASE.to_string(),
            table: DEFAULT_TABLE.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl std::fmt::Debug for SqlStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlStoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("table", &self.table)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl SqlStoreConfig {
    /// Default configuration with the given password
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            ..Self::default()
        }
    }

    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| SqlStoreError::Config(format!("Invalid datastore config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that are embedded into SQL or the pool setup
    pub fn validate(&self) -> Result<()> {
        validate_table_name(&self.table)?;
        if self.max_connections == 0 {
            return Err(SqlStoreError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Connection options for PostgreSQL (TLS disabled)
    #[cfg(feature = "postgres")]
    pub fn pg_connect_options(&self) -> Result<sqlx::postgres::PgConnectOptions> {
        let password = self.password.as_deref().ok_or_else(|| {
            SqlStoreError::Config("A password is required to connect".to_string())
        })?;

        Ok(sqlx::postgres::PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(password)
            .database(&self.database)
            .ssl_mode(sqlx::postgres::PgSslMode::Disable))
    }
}

/// Load a configuration file
pub fn load_config(path: &Path) -> Result<SqlStoreConfig> {
    if !path.exists() {
        return Err(SqlStoreError::Config(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| SqlStoreError::Config(format!("Failed to read config: {}", e)))?;

    SqlStoreConfig::from_toml_str(&raw)
}
