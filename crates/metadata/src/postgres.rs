//! PostgreSQL-based entry store implementation.

use crate::error::MetadataResult;
use crate::models::{EntryRow, MismatchRow, NewEntry, OrphanRow};
use crate::planner::{Dialect, Param, QueryPlanner, Statement};
use crate::repos::{EntryRepo, EntryTransaction};
use crate::store::MetadataStore;
use async_trait::async_trait;
use pathmend_core::config::PgSslMode;
use pathmend_core::{EntryId, StorageId};
use sqlx::postgres::{
    PgArguments, PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode,
};
use sqlx::{Arguments, Pool, Postgres, Transaction};
use std::str::FromStr;
use std::sync::Arc;

/// Encode planner parameters as PostgreSQL bind arguments.
fn pg_args(params: Vec<Param>) -> MetadataResult<PgArguments> {
    let mut args = PgArguments::default();
    for param in params {
        match param {
            Param::Int(value) => args.add(value),
            Param::Text(value) => args.add(value),
        }
        .map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}

/// PostgreSQL-based entry store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
    planner: Arc<QueryPlanner>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        table: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, table, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// This allows credentials to be passed separately (e.g. the password via
    /// an environment variable).
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        table: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, table, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        table: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let planner = QueryPlanner::new(Dialect::Postgres, table)?;

        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            planner: Arc::new(planner),
        };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        for ddl in self.planner.schema_statements() {
            sqlx::query(&ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }
}

struct PgEntryTransaction {
    tx: Transaction<'static, Postgres>,
    planner: Arc<QueryPlanner>,
}

#[async_trait]
impl EntryTransaction for PgEntryTransaction {
    async fn get_entry(&mut self, id: EntryId) -> MetadataResult<Option<EntryRow>> {
        let Statement { sql, params } = self.planner.get_entry(id);
        let row = sqlx::query_as_with::<_, EntryRow, _>(&sql, pg_args(params)?)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn find_entry_by_storage_and_path(
        &mut self,
        storage_id: StorageId,
        path: &str,
    ) -> MetadataResult<Option<EntryId>> {
        let Statement { sql, params } = self
            .planner
            .find_entry_by_storage_and_path(storage_id, path);
        let id = sqlx::query_scalar_with::<_, i64, _>(&sql, pg_args(params)?)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(id)
    }

    async fn delete_entry(&mut self, storage_id: StorageId, path: &str) -> MetadataResult<u64> {
        let Statement { sql, params } = self.planner.delete_entry(storage_id, path);
        let result = sqlx::query_with(&sql, pg_args(params)?)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn update_path_and_storage(
        &mut self,
        id: EntryId,
        path: &str,
        path_hash: &str,
        storage_id: StorageId,
    ) -> MetadataResult<()> {
        let Statement { sql, params } = self
            .planner
            .update_path_and_storage(id, path, path_hash, storage_id);
        sqlx::query_with(&sql, pg_args(params)?)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_parent(&mut self, id: EntryId, parent: EntryId) -> MetadataResult<()> {
        let Statement { sql, params } = self.planner.update_parent(id, parent);
        sqlx::query_with(&sql, pg_args(params)?)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> MetadataResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> MetadataResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl EntryRepo for PostgresStore {
    async fn begin(&self) -> MetadataResult<Box<dyn EntryTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgEntryTransaction {
            tx,
            planner: self.planner.clone(),
        }))
    }

    async fn find_mismatched_paths(
        &self,
        limit: u32,
        after: Option<EntryId>,
        storage_id: Option<StorageId>,
    ) -> MetadataResult<Vec<MismatchRow>> {
        let Statement { sql, params } =
            self.planner
                .select_mismatched_paths(limit, after, storage_id);
        let rows = sqlx::query_as_with::<_, MismatchRow, _>(&sql, pg_args(params)?)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn find_orphan_parents(
        &self,
        limit: u32,
        after: Option<EntryId>,
        storage_id: Option<StorageId>,
    ) -> MetadataResult<Vec<OrphanRow>> {
        let Statement { sql, params } =
            self.planner
                .select_orphan_parents(limit, after, storage_id);
        let rows = sqlx::query_as_with::<_, OrphanRow, _>(&sql, pg_args(params)?)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count_mismatches(&self, storage_id: Option<StorageId>) -> MetadataResult<u64> {
        let Statement { sql, params } = self.planner.count_mismatched_paths(storage_id);
        let count = sqlx::query_scalar_with::<_, i64, _>(&sql, pg_args(params)?)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn count_orphans(&self, storage_id: Option<StorageId>) -> MetadataResult<u64> {
        let Statement { sql, params } = self.planner.count_orphan_parents(storage_id);
        let count = sqlx::query_scalar_with::<_, i64, _>(&sql, pg_args(params)?)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn get_entry(&self, id: EntryId) -> MetadataResult<Option<EntryRow>> {
        let Statement { sql, params } = self.planner.get_entry(id);
        let row = sqlx::query_as_with::<_, EntryRow, _>(&sql, pg_args(params)?)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_entry(&self, entry: &NewEntry) -> MetadataResult<EntryId> {
        let Statement { sql, params } = self.planner.insert_entry(
            entry.storage_id,
            &entry.path,
            &pathmend_core::path_hash(&entry.path),
            &entry.name,
            entry.parent,
        );
        let id = sqlx::query_scalar_with::<_, i64, _>(&sql, pg_args(params)?)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn count_entries(&self) -> MetadataResult<u64> {
        let Statement { sql, params } = self.planner.count_entries();
        let count = sqlx::query_scalar_with::<_, i64, _>(&sql, pg_args(params)?)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pg_args_binds_every_parameter() {
        let args = pg_args(vec![
            Param::Int(7),
            Param::Int(200),
            Param::Text("files".to_string()),
        ])
        .unwrap();
        assert_eq!(args.len(), 3);
    }
}
