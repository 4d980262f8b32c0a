//! Database models mapping to the entry table.

use pathmend_core::{EntryId, StorageId};
use sqlx::FromRow;

/// A full entry row.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct EntryRow {
    pub id: EntryId,
    pub storage_id: StorageId,
    pub path: String,
    pub path_hash: String,
    pub name: String,
    pub parent: EntryId,
}

/// Values for inserting an entry. The path hash is derived from `path`.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub storage_id: StorageId,
    pub path: String,
    pub name: String,
    pub parent: EntryId,
}

impl NewEntry {
    /// Entry at `path` whose name is the last path component.
    pub fn new(storage_id: StorageId, path: impl Into<String>, parent: EntryId) -> Self {
        let path = path.into();
        let name = pathmend_core::entry::base_name(&path).to_string();
        Self {
            storage_id,
            path,
            name,
            parent,
        }
    }
}

/// An entry whose cached path or storage disagrees with its resolvable parent.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct MismatchRow {
    pub storage_id: StorageId,
    pub id: EntryId,
    pub path: String,
    pub name: String,
    pub parent_storage_id: StorageId,
    pub parent_path: String,
}

impl MismatchRow {
    /// Path this entry should carry according to its parent.
    pub fn expected_path(&self) -> String {
        pathmend_core::child_path(&self.parent_path, &self.name)
    }
}

/// An entry whose parent reference does not resolve.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OrphanRow {
    pub storage_id: StorageId,
    pub id: EntryId,
    pub path: String,
    pub parent: EntryId,
}

impl OrphanRow {
    /// Whether the parent reference points at the row itself.
    pub fn is_self_cycle(&self) -> bool {
        self.parent == self.id
    }
}
