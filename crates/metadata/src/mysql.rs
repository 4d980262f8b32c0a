//! MySQL-based entry store implementation.

use crate::error::MetadataResult;
use crate::models::{EntryRow, MismatchRow, NewEntry, OrphanRow};
use crate::planner::{Dialect, Param, QueryPlanner, Statement};
use crate::repos::{EntryRepo, EntryTransaction};
use crate::store::MetadataStore;
use async_trait::async_trait;
use pathmend_core::{EntryId, StorageId};
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{Arguments, MySql, Pool, Transaction};
use std::str::FromStr;
use std::sync::Arc;

/// Encode planner parameters as MySQL bind arguments.
fn mysql_args(params: Vec<Param>) -> MetadataResult<MySqlArguments> {
    let mut args = MySqlArguments::default();
    for param in params {
        match param {
            Param::Int(value) => args.add(value),
            Param::Text(value) => args.add(value),
        }
        .map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}

/// MySQL-based entry store.
pub struct MySqlStore {
    pool: Pool<MySql>,
    planner: Arc<QueryPlanner>,
}

impl MySqlStore {
    /// Create a new MySQL store from a connection URL.
    pub async fn from_url(url: &str, table: &str, max_connections: u32) -> MetadataResult<Self> {
        let planner = QueryPlanner::new(Dialect::MySql, table)?;
        let opts = MySqlConnectOptions::from_str(url)?;

        let pool = MySqlPoolOptions::new()
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
    pub fn pool(&self) -> &Pool<MySql> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for MySqlStore {
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
        Dialect::MySql
    }
}

struct MySqlEntryTransaction {
    tx: Transaction<'static, MySql>,
    planner: Arc<QueryPlanner>,
}

#[async_trait]
impl EntryTransaction for MySqlEntryTransaction {
    async fn get_entry(&mut self, id: EntryId) -> MetadataResult<Option<EntryRow>> {
        let Statement { sql, params } = self.planner.get_entry(id);
        let row = sqlx::query_as_with::<_, EntryRow, _>(&sql, mysql_args(params)?)
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
        let id = sqlx::query_scalar_with::<_, i64, _>(&sql, mysql_args(params)?)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(id)
    }

    async fn delete_entry(&mut self, storage_id: StorageId, path: &str) -> MetadataResult<u64> {
        let Statement { sql, params } = self.planner.delete_entry(storage_id, path);
        let result = sqlx::query_with(&sql, mysql_args(params)?)
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
        sqlx::query_with(&sql, mysql_args(params)?)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_parent(&mut self, id: EntryId, parent: EntryId) -> MetadataResult<()> {
        let Statement { sql, params } = self.planner.update_parent(id, parent);
        sqlx::query_with(&sql, mysql_args(params)?)
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
impl EntryRepo for MySqlStore {
    async fn begin(&self) -> MetadataResult<Box<dyn EntryTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlEntryTransaction {
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
        let rows = sqlx::query_as_with::<_, MismatchRow, _>(&sql, mysql_args(params)?)
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
        let rows = sqlx::query_as_with::<_, OrphanRow, _>(&sql, mysql_args(params)?)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count_mismatches(&self, storage_id: Option<StorageId>) -> MetadataResult<u64> {
        let Statement { sql, params } = self.planner.count_mismatched_paths(storage_id);
        let count = sqlx::query_scalar_with::<_, i64, _>(&sql, mysql_args(params)?)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn count_orphans(&self, storage_id: Option<StorageId>) -> MetadataResult<u64> {
        let Statement { sql, params } = self.planner.count_orphan_parents(storage_id);
        let count = sqlx::query_scalar_with::<_, i64, _>(&sql, mysql_args(params)?)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn get_entry(&self, id: EntryId) -> MetadataResult<Option<EntryRow>> {
        let Statement { sql, params } = self.planner.get_entry(id);
        let row = sqlx::query_as_with::<_, EntryRow, _>(&sql, mysql_args(params)?)
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
        let result = sqlx::query_with(&sql, mysql_args(params)?)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_id() as EntryId)
    }

    async fn count_entries(&self) -> MetadataResult<u64> {
        let Statement { sql, params } = self.planner.count_entries();
        let count = sqlx::query_scalar_with::<_, i64, _>(&sql, mysql_args(params)?)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_args_binds_in_order() {
        let args = mysql_args(vec![Param::Int(200), Param::Text("files".to_string())]).unwrap();
        assert_eq!(args.len(), 2);
    }
}
