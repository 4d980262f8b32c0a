//! Configuration types shared across crates.

use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_TABLE, DEFAULT_WARNING_BATCH_SIZE, StorageId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for a repair run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Entry store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Repair behaviour.
    #[serde(default)]
    pub repair: RepairConfig,
}

impl AppConfig {
    /// Validate the whole configuration.
    pub fn validate(&self) -> crate::Result<()> {
        self.store.validate()?;
        self.repair.validate()
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Entry store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// SQLite database file.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Entry table name.
        #[serde(default = "default_table")]
        table: String,
        /// Busy timeout in seconds while waiting on a locked database.
        #[serde(default = "default_sqlite_busy_timeout_secs")]
        busy_timeout_secs: u64,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL (optional if using individual fields).
        /// Takes precedence over individual fields if both are provided.
        url: Option<String>,
        /// Database host.
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// Prefer PATHMEND_STORE__PASSWORD over storing it in the config file.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
        /// Entry table name.
        #[serde(default = "default_table")]
        table: String,
    },
    /// MySQL / MariaDB database.
    Mysql {
        /// Connection URL.
        url: String,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Entry table name.
        #[serde(default = "default_table")]
        table: String,
    },
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(300_000) // 5 minutes
}

fn default_sqlite_busy_timeout_secs() -> u64 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/namespace.db"),
            table: default_table(),
            busy_timeout_secs: default_sqlite_busy_timeout_secs(),
        }
    }
}

impl StoreConfig {
    /// Entry table name for this backend.
    pub fn table(&self) -> &str {
        match self {
            StoreConfig::Sqlite { table, .. }
            | StoreConfig::Postgres { table, .. }
            | StoreConfig::Mysql { table, .. } => table,
        }
    }

    /// Validate store configuration invariants.
    pub fn validate(&self) -> crate::Result<()> {
        crate::validate_identifier(self.table())?;
        match self {
            StoreConfig::Sqlite { .. } | StoreConfig::Mysql { .. } => Ok(()),
            StoreConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => Err(crate::Error::InvalidConfig(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                )),
                (None, Some(_), None) => Err(crate::Error::InvalidConfig(
                    "postgres config requires 'database' when using individual fields"
                        .to_string(),
                )),
            },
        }
    }
}

/// Repair run configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Rows fetched per round.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    /// Number of ids listed per unrepairable-orphan warning.
    #[serde(default = "default_warning_batch_size")]
    pub warning_batch_size: usize,
    /// Maximum rounds per pass. Parent cycles spanning several rows never
    /// converge, so a pass stops here with a warning.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u64,
    /// Restrict detection to one storage.
    #[serde(default)]
    pub storage_id: Option<StorageId>,
    /// Count inconsistencies without modifying anything.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_chunk_size() -> u32 {
    DEFAULT_CHUNK_SIZE
}

fn default_warning_batch_size() -> usize {
    DEFAULT_WARNING_BATCH_SIZE
}

fn default_max_rounds() -> u64 {
    100_000
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            warning_batch_size: default_warning_batch_size(),
            max_rounds: default_max_rounds(),
            storage_id: None,
            dry_run: false,
        }
    }
}

impl RepairConfig {
    /// Validate repair configuration invariants.
    pub fn validate(&self) -> crate::Result<()> {
        if self.chunk_size == 0 {
            return Err(crate::Error::InvalidConfig(
                "repair.chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.warning_batch_size == 0 {
            return Err(crate::Error::InvalidConfig(
                "repair.warning_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.max_rounds == 0 {
            return Err(crate::Error::InvalidConfig(
                "repair.max_rounds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_config_defaults() {
        let config = RepairConfig::default();
        assert_eq!(config.chunk_size, 200);
        assert_eq!(config.warning_batch_size, 100);
        assert!(!config.dry_run);
        assert!(config.storage_id.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_repair_config_rejects_zero_chunk_size() {
        let config = RepairConfig {
            chunk_size: 0,
            ..RepairConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_config_sqlite_defaults_table() {
        let json = r#"{"type":"sqlite","path":"/tmp/ns.db"}"#;
        let config: StoreConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.table(), "filecache");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_store_config_rejects_bad_table() {
        let json = r#"{"type":"mysql","url":"mysql://localhost/db","table":"x; drop"}"#;
        let config: StoreConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_config_postgres_requires_url_or_host() {
        let json = r#"{"type":"postgres"}"#;
        let config: StoreConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());

        let json = r#"{"type":"postgres","host":"db"}"#;
        let config: StoreConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());

        let json = r#"{"type":"postgres","host":"db","database":"cloud"}"#;
        let config: StoreConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());

        let json = r#"{"type":"postgres","url":"postgres://u:p@db/cloud"}"#;
        let config: StoreConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_defaults_to_sqlite() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert!(matches!(config.store, StoreConfig::Sqlite { .. }));
        assert_eq!(config.repair.chunk_size, 200);
    }
}
