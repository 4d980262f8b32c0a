//! Entry repository.

use crate::error::MetadataResult;
use crate::models::{EntryRow, MismatchRow, NewEntry, OrphanRow};
use async_trait::async_trait;
use pathmend_core::{EntryId, StorageId};

/// Single-row mutations and lookups executed inside one transaction.
///
/// Dropping a transaction without calling [`EntryTransaction::commit`] rolls it back.
#[async_trait]
pub trait EntryTransaction: Send {
    /// Re-read an entry inside the transaction.
    async fn get_entry(&mut self, id: EntryId) -> MetadataResult<Option<EntryRow>>;

    /// Id of the entry at `(storage_id, path)`, if any.
    async fn find_entry_by_storage_and_path(
        &mut self,
        storage_id: StorageId,
        path: &str,
    ) -> MetadataResult<Option<EntryId>>;

    /// Delete the entry at `(storage_id, path)`. Returns the number of rows removed.
    async fn delete_entry(&mut self, storage_id: StorageId, path: &str) -> MetadataResult<u64>;

    /// Overwrite the cached path, path hash and storage of an entry.
    async fn update_path_and_storage(
        &mut self,
        id: EntryId,
        path: &str,
        path_hash: &str,
        storage_id: StorageId,
    ) -> MetadataResult<()>;

    /// Repoint the parent reference of an entry.
    async fn update_parent(&mut self, id: EntryId, parent: EntryId) -> MetadataResult<()>;

    /// Commit the transaction.
    async fn commit(self: Box<Self>) -> MetadataResult<()>;

    /// Roll the transaction back explicitly.
    async fn rollback(self: Box<Self>) -> MetadataResult<()>;
}

/// Repository for entry table operations.
#[async_trait]
pub trait EntryRepo: Send + Sync {
    /// Begin a transaction for a single-row fix.
    async fn begin(&self) -> MetadataResult<Box<dyn EntryTransaction>>;

    /// Up to `limit` entries with a resolvable parent whose path or storage
    /// disagrees with that parent, in id order past `after`, optionally scoped
    /// to one storage.
    async fn find_mismatched_paths(
        &self,
        limit: u32,
        after: Option<EntryId>,
        storage_id: Option<StorageId>,
    ) -> MetadataResult<Vec<MismatchRow>>;

    /// Up to `limit` entries whose parent is missing or self-referential, in
    /// id order past `after`. Callers skip rows they already gave up on by
    /// moving the cursor beyond them.
    async fn find_orphan_parents(
        &self,
        limit: u32,
        after: Option<EntryId>,
        storage_id: Option<StorageId>,
    ) -> MetadataResult<Vec<OrphanRow>>;

    /// Total number of path-mismatched entries.
    async fn count_mismatches(&self, storage_id: Option<StorageId>) -> MetadataResult<u64>;

    /// Total number of orphan-parent entries.
    async fn count_orphans(&self, storage_id: Option<StorageId>) -> MetadataResult<u64>;

    /// Get an entry by id.
    async fn get_entry(&self, id: EntryId) -> MetadataResult<Option<EntryRow>>;

    /// Insert an entry and return its id. Used by writers and fixtures; the
    /// repair engine itself never creates entries.
    async fn insert_entry(&self, entry: &NewEntry) -> MetadataResult<EntryId>;

    /// Total number of entries.
    async fn count_entries(&self) -> MetadataResult<u64>;
}
