//! Entry store abstraction and implementations for pathmend.
//!
//! This crate provides access to the namespace entry table:
//! - Dialect-aware construction of the path-mismatch and orphan-parent predicates
//! - Bounded detection queries and counts
//! - Transaction-scoped single-row lookups and mutations
//! - SQLite, PostgreSQL and MySQL backends

pub mod error;
pub mod models;
pub mod mysql;
pub mod planner;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use mysql::MySqlStore;
pub use planner::{Dialect, QueryPlanner};
pub use postgres::PostgresStore;
pub use repos::{EntryRepo, EntryTransaction};
pub use store::{MetadataStore, SqliteStore};

use pathmend_core::config::StoreConfig;
use std::sync::Arc;

/// Create an entry store from configuration.
pub async fn from_config(config: &StoreConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    config.validate()?;
    match config {
        StoreConfig::Sqlite {
            path,
            table,
            busy_timeout_secs,
        } => {
            let store = SqliteStore::new(path, table, Some(*busy_timeout_secs)).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
        StoreConfig::Postgres {
            url,
            host,
            port,
            username,
            password,
            database,
            ssl_mode,
            max_connections,
            statement_timeout_ms,
            table,
        } => {
            let store = if let Some(url) = url {
                // URL takes precedence over individual fields
                tracing::info!("Connecting to PostgreSQL using connection URL");
                PostgresStore::from_url(url, table, *max_connections, *statement_timeout_ms)
                    .await?
            } else if let (Some(host), Some(database)) = (host.as_ref(), database.as_ref()) {
                PostgresStore::from_params(
                    host,
                    port.unwrap_or(5432),
                    username.as_deref(),
                    password.as_deref(),
                    database,
                    *ssl_mode,
                    table,
                    *max_connections,
                    *statement_timeout_ms,
                )
                .await?
            } else {
                return Err(MetadataError::Config(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ));
            };
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
        StoreConfig::Mysql {
            url,
            max_connections,
            table,
        } => {
            tracing::info!("Connecting to MySQL using connection URL");
            let store = MySqlStore::from_url(url, table, *max_connections).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathmend_core::config::StoreConfig;

    #[tokio::test]
    async fn test_from_config_sqlite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("namespace.db");
        let config = StoreConfig::Sqlite {
            path: db_path.clone(),
            table: "oc_filecache".to_string(),
            busy_timeout_secs: 5,
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        assert_eq!(store.dialect(), Dialect::Sqlite);
        assert_eq!(store.count_entries().await.unwrap(), 0);
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_from_config_rejects_bad_table() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::Sqlite {
            path: temp_dir.path().join("namespace.db"),
            table: "bad table".to_string(),
            busy_timeout_secs: 5,
        };

        let err = from_config(&config).await.err().unwrap();
        assert!(matches!(err, MetadataError::InvalidIdentifier(_)));
    }
}
