//! SQL construction for the entry table.
//!
//! Everything here is pure string building. Backends differ in two places:
//! path concatenation (`CONCAT(a, b)` on MySQL, `a || b` elsewhere) and bind
//! placeholders (`$n` on PostgreSQL, `?` elsewhere). Predicate semantics are
//! identical across dialects.

use crate::error::{MetadataError, MetadataResult};
use pathmend_core::{EntryId, ROOT_PARENT, StorageId};
use std::fmt;

/// SQL dialect of the backing database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
        }
    }

    /// Concatenate SQL expressions.
    pub fn concat(&self, parts: &[&str]) -> String {
        match self {
            Self::MySql => format!("CONCAT({})", parts.join(", ")),
            Self::Sqlite | Self::Postgres => parts.join(" || "),
        }
    }

    /// Placeholder for the `index`-th bind parameter (1-based).
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${index}"),
            Self::Sqlite | Self::MySql => "?".to_string(),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bind parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Int(i64),
    Text(String),
}

/// SQL text plus its parameters, in bind order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

struct SqlBuilder {
    dialect: Dialect,
    sql: String,
    params: Vec<Param>,
}

impl SqlBuilder {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    fn bind(&mut self, param: Param) -> &mut Self {
        self.params.push(param);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Builds every statement the entry store executes.
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    dialect: Dialect,
    table: String,
}

impl QueryPlanner {
    /// Create a planner for `table` on `dialect`.
    ///
    /// The table name is spliced into SQL text, so it must be a plain identifier.
    pub fn new(dialect: Dialect, table: &str) -> MetadataResult<Self> {
        pathmend_core::validate_identifier(table)
            .map_err(|_| MetadataError::InvalidIdentifier(table.to_string()))?;
        Ok(Self {
            dialect,
            table: table.to_string(),
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Join of entries to their resolvable parent where the cached path or
    /// storage disagrees with the parent. Parents with an empty path (storage
    /// roots) are exempt and self-referencing rows are left to the orphan pass.
    fn push_mismatch_predicate(&self, b: &mut SqlBuilder, storage_id: Option<StorageId>) {
        let expected = self.dialect.concat(&["p.path", "'/'", "e.name"]);
        b.push(&format!(
            "FROM {table} e INNER JOIN {table} p ON e.parent = p.id \
             WHERE ({expected} <> e.path OR e.storage_id <> p.storage_id) \
             AND p.path <> '' \
             AND e.id <> p.id",
            table = self.table,
        ));
        if let Some(storage_id) = storage_id {
            b.push(" AND (e.storage_id = ");
            b.bind(Param::Int(storage_id));
            b.push(" OR p.storage_id = ");
            b.bind(Param::Int(storage_id));
            b.push(")");
        }
    }

    /// Entries whose parent is not the root sentinel and either points at
    /// themselves or at no existing row.
    fn push_orphan_predicate(&self, b: &mut SqlBuilder, storage_id: Option<StorageId>) {
        b.push(&format!(
            "FROM {table} e \
             WHERE e.parent <> {ROOT_PARENT} \
             AND (e.parent = e.id OR NOT EXISTS (SELECT 1 FROM {table} p WHERE p.id = e.parent))",
            table = self.table,
        ));
        if let Some(storage_id) = storage_id {
            b.push(" AND e.storage_id = ");
            b.bind(Param::Int(storage_id));
        }
    }

    /// Keyset tail shared by the detection selects: rows past `after`, in id order.
    fn push_page(&self, b: &mut SqlBuilder, after: Option<EntryId>, limit: u32) {
        if let Some(after) = after {
            b.push(" AND e.id > ");
            b.bind(Param::Int(after));
        }
        b.push(" ORDER BY e.id LIMIT ");
        b.bind(Param::Int(i64::from(limit)));
    }

    /// Select up to `limit` path-mismatched rows with an id greater than `after`.
    pub fn select_mismatched_paths(
        &self,
        limit: u32,
        after: Option<EntryId>,
        storage_id: Option<StorageId>,
    ) -> Statement {
        let mut b = SqlBuilder::new(self.dialect);
        b.push(
            "SELECT e.storage_id AS storage_id, e.id AS id, e.path AS path, e.name AS name, \
             p.storage_id AS parent_storage_id, p.path AS parent_path ",
        );
        self.push_mismatch_predicate(&mut b, storage_id);
        self.push_page(&mut b, after, limit);
        b.finish()
    }

    /// Count path-mismatched rows.
    pub fn count_mismatched_paths(&self, storage_id: Option<StorageId>) -> Statement {
        let mut b = SqlBuilder::new(self.dialect);
        b.push("SELECT COUNT(*) ");
        self.push_mismatch_predicate(&mut b, storage_id);
        b.finish()
    }

    /// Select up to `limit` orphan-parent rows with an id greater than `after`.
    ///
    /// Rows at or below the cursor are never bound back into the query, so a
    /// pass can step over any number of unrepairable rows.
    pub fn select_orphan_parents(
        &self,
        limit: u32,
        after: Option<EntryId>,
        storage_id: Option<StorageId>,
    ) -> Statement {
        let mut b = SqlBuilder::new(self.dialect);
        b.push("SELECT e.storage_id AS storage_id, e.id AS id, e.path AS path, e.parent AS parent ");
        self.push_orphan_predicate(&mut b, storage_id);
        self.push_page(&mut b, after, limit);
        b.finish()
    }

    /// Count orphan-parent rows.
    pub fn count_orphan_parents(&self, storage_id: Option<StorageId>) -> Statement {
        let mut b = SqlBuilder::new(self.dialect);
        b.push("SELECT COUNT(*) ");
        self.push_orphan_predicate(&mut b, storage_id);
        b.finish()
    }

    /// Look up the id at `(storage_id, path)`.
    ///
    /// Matches on the path itself, not the cached hash: an occupant with a
    /// stale `path_hash` still occupies its path.
    pub fn find_entry_by_storage_and_path(
        &self,
        storage_id: StorageId,
        path: &str,
    ) -> Statement {
        let mut b = SqlBuilder::new(self.dialect);
        b.push(&format!("SELECT id FROM {} WHERE storage_id = ", self.table));
        self.push_storage_path(&mut b, storage_id, path);
        b.finish()
    }

    /// Delete the row at `(storage_id, path)`.
    pub fn delete_entry(&self, storage_id: StorageId, path: &str) -> Statement {
        let mut b = SqlBuilder::new(self.dialect);
        b.push(&format!("DELETE FROM {} WHERE storage_id = ", self.table));
        self.push_storage_path(&mut b, storage_id, path);
        b.finish()
    }

    fn push_storage_path(&self, b: &mut SqlBuilder, storage_id: StorageId, path: &str) {
        b.bind(Param::Int(storage_id));
        b.push(" AND path = ");
        b.bind(Param::Text(path.to_string()));
    }

    pub fn update_path_and_storage(
        &self,
        id: EntryId,
        path: &str,
        path_hash: &str,
        storage_id: StorageId,
    ) -> Statement {
        let mut b = SqlBuilder::new(self.dialect);
        b.push(&format!("UPDATE {} SET path = ", self.table));
        b.bind(Param::Text(path.to_string()));
        b.push(", path_hash = ");
        b.bind(Param::Text(path_hash.to_string()));
        b.push(", storage_id = ");
        b.bind(Param::Int(storage_id));
        b.push(" WHERE id = ");
        b.bind(Param::Int(id));
        b.finish()
    }

    pub fn update_parent(&self, id: EntryId, parent: EntryId) -> Statement {
        let mut b = SqlBuilder::new(self.dialect);
        b.push(&format!("UPDATE {} SET parent = ", self.table));
        b.bind(Param::Int(parent));
        b.push(" WHERE id = ");
        b.bind(Param::Int(id));
        b.finish()
    }

    pub fn get_entry(&self, id: EntryId) -> Statement {
        let mut b = SqlBuilder::new(self.dialect);
        b.push(&format!(
            "SELECT id, storage_id, path, path_hash, name, parent FROM {} WHERE id = ",
            self.table
        ));
        b.bind(Param::Int(id));
        b.finish()
    }

    pub fn count_entries(&self) -> Statement {
        Statement {
            sql: format!("SELECT COUNT(*) FROM {}", self.table),
            params: Vec::new(),
        }
    }

    /// Insert a row. SQLite and PostgreSQL return the new id; MySQL callers
    /// read `last_insert_id` instead.
    pub fn insert_entry(
        &self,
        storage_id: StorageId,
        path: &str,
        path_hash: &str,
        name: &str,
        parent: EntryId,
    ) -> Statement {
        let mut b = SqlBuilder::new(self.dialect);
        b.push(&format!(
            "INSERT INTO {} (storage_id, path, path_hash, name, parent) VALUES (",
            self.table
        ));
        b.bind(Param::Int(storage_id));
        b.push(", ");
        b.bind(Param::Text(path.to_string()));
        b.push(", ");
        b.bind(Param::Text(path_hash.to_string()));
        b.push(", ");
        b.bind(Param::Text(name.to_string()));
        b.push(", ");
        b.bind(Param::Int(parent));
        b.push(")");
        if self.dialect != Dialect::MySql {
            b.push(" RETURNING id");
        }
        b.finish()
    }

    /// DDL creating the entry table and its indexes when missing.
    pub fn schema_statements(&self) -> Vec<String> {
        let t = &self.table;
        match self.dialect {
            Dialect::Sqlite => vec![
                format!(
                    "CREATE TABLE IF NOT EXISTS {t} (\
                     id INTEGER PRIMARY KEY AUTOINCREMENT, \
                     storage_id INTEGER NOT NULL, \
                     path TEXT NOT NULL, \
                     path_hash TEXT NOT NULL, \
                     name TEXT NOT NULL, \
                     parent INTEGER NOT NULL DEFAULT {ROOT_PARENT})"
                ),
                format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS {t}_storage_path_hash ON {t} (storage_id, path_hash)"
                ),
                format!("CREATE INDEX IF NOT EXISTS {t}_storage_path ON {t} (storage_id, path)"),
                format!("CREATE INDEX IF NOT EXISTS {t}_parent ON {t} (parent)"),
            ],
            Dialect::Postgres => vec![
                format!(
                    "CREATE TABLE IF NOT EXISTS {t} (\
                     id BIGSERIAL PRIMARY KEY, \
                     storage_id BIGINT NOT NULL, \
                     path TEXT NOT NULL, \
                     path_hash VARCHAR(32) NOT NULL, \
                     name TEXT NOT NULL, \
                     parent BIGINT NOT NULL DEFAULT {ROOT_PARENT})"
                ),
                format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS {t}_storage_path_hash ON {t} (storage_id, path_hash)"
                ),
                // btree keys are size-capped and paths are not, hence a hash index.
                format!("CREATE INDEX IF NOT EXISTS {t}_path ON {t} USING hash (path)"),
                format!("CREATE INDEX IF NOT EXISTS {t}_parent ON {t} (parent)"),
            ],
            Dialect::MySql => vec![format!(
                "CREATE TABLE IF NOT EXISTS {t} (\
                 id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY, \
                 storage_id BIGINT NOT NULL, \
                 path VARCHAR(4000) COLLATE utf8mb4_bin NOT NULL, \
                 path_hash VARCHAR(32) NOT NULL, \
                 name VARCHAR(250) COLLATE utf8mb4_bin NOT NULL, \
                 parent BIGINT NOT NULL DEFAULT {ROOT_PARENT}, \
                 UNIQUE KEY {t}_storage_path_hash (storage_id, path_hash), \
                 KEY {t}_storage_path (storage_id, path(191)), \
                 KEY {t}_parent (parent)\
                 ) DEFAULT CHARSET = utf8mb4"
            )],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner(dialect: Dialect) -> QueryPlanner {
        QueryPlanner::new(dialect, "filecache").unwrap()
    }

    #[test]
    fn test_rejects_unsafe_table_name() {
        let err = QueryPlanner::new(Dialect::Sqlite, "filecache; DROP TABLE x").unwrap_err();
        assert!(matches!(err, MetadataError::InvalidIdentifier(_)));
    }

    #[test]
    fn test_concat_per_dialect() {
        assert_eq!(
            Dialect::MySql.concat(&["p.path", "'/'", "e.name"]),
            "CONCAT(p.path, '/', e.name)"
        );
        assert_eq!(
            Dialect::Sqlite.concat(&["p.path", "'/'", "e.name"]),
            "p.path || '/' || e.name"
        );
        assert_eq!(
            Dialect::Postgres.concat(&["p.path", "'/'", "e.name"]),
            "p.path || '/' || e.name"
        );
    }

    #[test]
    fn test_mismatch_select_sqlite() {
        let stmt = planner(Dialect::Sqlite).select_mismatched_paths(200, None, None);
        assert!(stmt.sql.contains("p.path || '/' || e.name <> e.path"));
        assert!(stmt.sql.contains("e.storage_id <> p.storage_id"));
        assert!(stmt.sql.contains("p.path <> ''"));
        assert!(stmt.sql.contains("e.id <> p.id"));
        assert!(stmt.sql.ends_with("LIMIT ?"));
        assert_eq!(stmt.params, vec![Param::Int(200)]);
    }

    #[test]
    fn test_mismatch_select_mysql_uses_concat_function() {
        let stmt = planner(Dialect::MySql).select_mismatched_paths(50, None, None);
        assert!(stmt.sql.contains("CONCAT(p.path, '/', e.name) <> e.path"));
        assert!(!stmt.sql.contains("||"));
    }

    #[test]
    fn test_mismatch_select_postgres_numbers_placeholders() {
        let stmt = planner(Dialect::Postgres).select_mismatched_paths(10, Some(41), Some(7));
        assert!(stmt.sql.contains("(e.storage_id = $1 OR p.storage_id = $2)"));
        assert!(stmt.sql.contains("AND e.id > $3 ORDER BY e.id"));
        assert!(stmt.sql.ends_with("LIMIT $4"));
        assert_eq!(
            stmt.params,
            vec![Param::Int(7), Param::Int(7), Param::Int(41), Param::Int(10)]
        );
    }

    #[test]
    fn test_mismatch_count_shares_predicate() {
        let p = planner(Dialect::Sqlite);
        let count = p.count_mismatched_paths(None);
        let select = p.select_mismatched_paths(1, None, None);
        let count_where = count.sql.split_once("FROM").unwrap().1;
        let select_where = select.sql.split_once("FROM").unwrap().1;
        assert!(select_where.starts_with(count_where));
        assert!(count.params.is_empty());
    }

    #[test]
    fn test_orphan_select_excludes_root_and_cycles() {
        let stmt = planner(Dialect::Sqlite).select_orphan_parents(200, None, None);
        assert!(stmt.sql.contains("e.parent <> -1"));
        assert!(stmt.sql.contains("e.parent = e.id OR NOT EXISTS"));
        assert!(!stmt.sql.contains("e.id >"));
        assert_eq!(stmt.params, vec![Param::Int(200)]);
    }

    #[test]
    fn test_orphan_select_cursor_binds_one_parameter() {
        let stmt = planner(Dialect::MySql).select_orphan_parents(20, Some(40_000), Some(3));
        assert!(stmt.sql.contains("e.storage_id = ? AND e.id > ? ORDER BY e.id LIMIT ?"));
        assert_eq!(
            stmt.params,
            vec![Param::Int(3), Param::Int(40_000), Param::Int(20)]
        );
    }

    #[test]
    fn test_orphan_select_postgres_cursor() {
        let stmt = planner(Dialect::Postgres).select_orphan_parents(20, Some(9), None);
        assert!(stmt.sql.contains("AND e.id > $1 ORDER BY e.id LIMIT $2"));
        assert_eq!(stmt.params, vec![Param::Int(9), Param::Int(20)]);
    }

    #[test]
    fn test_lookup_and_delete_key_on_storage_and_path() {
        let p = planner(Dialect::Postgres);
        let stmt = p.find_entry_by_storage_and_path(2, "files/a");
        assert_eq!(
            stmt.sql,
            "SELECT id FROM filecache WHERE storage_id = $1 AND path = $2"
        );
        assert_eq!(
            stmt.params,
            vec![Param::Int(2), Param::Text("files/a".to_string())]
        );

        let stmt = p.delete_entry(2, "files/a");
        assert_eq!(
            stmt.sql,
            "DELETE FROM filecache WHERE storage_id = $1 AND path = $2"
        );
        assert!(!stmt.sql.contains("path_hash"));
    }

    #[test]
    fn test_insert_returning_per_dialect() {
        let sqlite = planner(Dialect::Sqlite).insert_entry(1, "files", "h", "files", -1);
        assert!(sqlite.sql.ends_with("RETURNING id"));
        let mysql = planner(Dialect::MySql).insert_entry(1, "files", "h", "files", -1);
        assert!(!mysql.sql.contains("RETURNING"));
    }

    #[test]
    fn test_schema_uses_table_name() {
        let p = QueryPlanner::new(Dialect::Sqlite, "oc_filecache").unwrap();
        let ddl = p.schema_statements();
        assert_eq!(ddl.len(), 4);
        assert!(ddl[0].starts_with("CREATE TABLE IF NOT EXISTS oc_filecache"));
        assert!(ddl[1].contains("oc_filecache_storage_path_hash"));
        assert!(ddl[2].contains("oc_filecache_storage_path ON oc_filecache (storage_id, path)"));

        let mysql = QueryPlanner::new(Dialect::MySql, "oc_filecache").unwrap();
        assert!(mysql.schema_statements()[0].contains("KEY oc_filecache_storage_path (storage_id, path(191))"));
    }
}
