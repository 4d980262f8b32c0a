//! Entry store trait and the SQLite implementation.

use crate::error::MetadataResult;
use crate::planner::{Dialect, Param, QueryPlanner, Statement};
use crate::repos::{EntryRepo, EntryTransaction};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Arguments, Pool, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Combined entry store trait.
#[async_trait]
pub trait MetadataStore: EntryRepo + Send + Sync {
    /// Create the entry table and its indexes when missing.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;

    /// SQL dialect of the backing database.
    fn dialect(&self) -> Dialect;
}

/// Encode planner parameters as SQLite bind arguments.
pub(crate) fn sqlite_args<'q>(params: Vec<Param>) -> MetadataResult<SqliteArguments<'q>> {
    let mut args = SqliteArguments::default();
    for param in params {
        match param {
            Param::Int(value) => args.add(value),
            Param::Text(value) => args.add(value),
        }
        .map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}

/// SQLite-based entry store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    planner: Arc<QueryPlanner>,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`. `":memory:"` opens a
    /// private in-memory database.
    pub async fn new(
        path: impl AsRef<Path>,
        table: &str,
        busy_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let planner = QueryPlanner::new(Dialect::Sqlite, table)?;

        let opts = if path == Path::new(":memory:") {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        };
        let opts = opts.busy_timeout(Duration::from_secs(busy_timeout_secs.unwrap_or(5)));

        let pool = SqlitePoolOptions::new()
            // A single connection serializes writers and keeps an in-memory
            // database alive for the lifetime of the pool.
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            planner: Arc::new(planner),
        };
        store.migrate().await?;

        tracing::debug!(
            path = %path.display(),
            table = store.planner.table(),
            "Opened SQLite entry store"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
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
        Dialect::Sqlite
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::{EntryRow, MismatchRow, NewEntry, OrphanRow};
    use pathmend_core::{EntryId, StorageId};

    struct SqliteEntryTransaction {
        tx: Transaction<'static, Sqlite>,
        planner: Arc<QueryPlanner>,
    }

    #[async_trait]
    impl EntryTransaction for SqliteEntryTransaction {
        async fn get_entry(&mut self, id: EntryId) -> MetadataResult<Option<EntryRow>> {
            let Statement { sql, params } = self.planner.get_entry(id);
            let row = sqlx::query_as_with::<_, EntryRow, _>(&sql, sqlite_args(params)?)
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
            let id = sqlx::query_scalar_with::<_, i64, _>(&sql, sqlite_args(params)?)
                .fetch_optional(&mut *self.tx)
                .await?;
            Ok(id)
        }

        async fn delete_entry(
            &mut self,
            storage_id: StorageId,
            path: &str,
        ) -> MetadataResult<u64> {
            let Statement { sql, params } = self.planner.delete_entry(storage_id, path);
            let result = sqlx::query_with(&sql, sqlite_args(params)?)
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
            sqlx::query_with(&sql, sqlite_args(params)?)
                .execute(&mut *self.tx)
                .await?;
            Ok(())
        }

        async fn update_parent(&mut self, id: EntryId, parent: EntryId) -> MetadataResult<()> {
            let Statement { sql, params } = self.planner.update_parent(id, parent);
            sqlx::query_with(&sql, sqlite_args(params)?)
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
    impl EntryRepo for SqliteStore {
        async fn begin(&self) -> MetadataResult<Box<dyn EntryTransaction>> {
            let tx = self.pool.begin().await?;
            Ok(Box::new(SqliteEntryTransaction {
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
            let rows = sqlx::query_as_with::<_, MismatchRow, _>(&sql, sqlite_args(params)?)
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
            let rows = sqlx::query_as_with::<_, OrphanRow, _>(&sql, sqlite_args(params)?)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn count_mismatches(&self, storage_id: Option<StorageId>) -> MetadataResult<u64> {
            let Statement { sql, params } = self.planner.count_mismatched_paths(storage_id);
            let count = sqlx::query_scalar_with::<_, i64, _>(&sql, sqlite_args(params)?)
                .fetch_one(&self.pool)
                .await?;
            Ok(count as u64)
        }

        async fn count_orphans(&self, storage_id: Option<StorageId>) -> MetadataResult<u64> {
            let Statement { sql, params } = self.planner.count_orphan_parents(storage_id);
            let count = sqlx::query_scalar_with::<_, i64, _>(&sql, sqlite_args(params)?)
                .fetch_one(&self.pool)
                .await?;
            Ok(count as u64)
        }

        async fn get_entry(&self, id: EntryId) -> MetadataResult<Option<EntryRow>> {
            let Statement { sql, params } = self.planner.get_entry(id);
            let row = sqlx::query_as_with::<_, EntryRow, _>(&sql, sqlite_args(params)?)
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
            let id = sqlx::query_scalar_with::<_, i64, _>(&sql, sqlite_args(params)?)
                .fetch_one(&self.pool)
                .await?;
            Ok(id)
        }

        async fn count_entries(&self) -> MetadataResult<u64> {
            let Statement { sql, params } = self.planner.count_entries();
            let count = sqlx::query_scalar_with::<_, i64, _>(&sql, sqlite_args(params)?)
                .fetch_one(&self.pool)
                .await?;
            Ok(count as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewEntry;

    async fn memory_store() -> SqliteStore {
        SqliteStore::new(":memory:", "filecache", None).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get_entry() {
        let store = memory_store().await;
        let id = store
            .insert_entry(&NewEntry::new(1, "files", -1))
            .await
            .unwrap();

        let entry = store.get_entry(id).await.unwrap().unwrap();
        assert_eq!(entry.path, "files");
        assert_eq!(entry.name, "files");
        assert_eq!(entry.path_hash, pathmend_core::path_hash("files"));
        assert_eq!(entry.parent, -1);
        assert_eq!(store.count_entries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = memory_store().await;
        let id = store
            .insert_entry(&NewEntry::new(1, "files", -1))
            .await
            .unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.update_parent(id, 99).await.unwrap();
        }

        let entry = store.get_entry(id).await.unwrap().unwrap();
        assert_eq!(entry.parent, -1);
    }

    #[tokio::test]
    async fn test_transaction_primitives() {
        let store = memory_store().await;
        let root = store
            .insert_entry(&NewEntry::new(1, "files", -1))
            .await
            .unwrap();
        let child = store
            .insert_entry(&NewEntry::new(1, "files/a", root))
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.find_entry_by_storage_and_path(1, "files/a").await.unwrap(),
            Some(child)
        );
        assert_eq!(tx.find_entry_by_storage_and_path(2, "files/a").await.unwrap(), None);
        tx.update_path_and_storage(child, "files/b", &pathmend_core::path_hash("files/b"), 2)
            .await
            .unwrap();
        assert_eq!(tx.delete_entry(1, "files").await.unwrap(), 1);
        tx.commit().await.unwrap();

        assert!(store.get_entry(root).await.unwrap().is_none());
        let moved = store.get_entry(child).await.unwrap().unwrap();
        assert_eq!(moved.path, "files/b");
        assert_eq!(moved.storage_id, 2);
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let store = memory_store().await;
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
        store.health_check().await.unwrap();
        assert_eq!(store.dialect(), Dialect::Sqlite);
    }
}
