//! Repair test utilities.

use pathmend_core::config::RepairConfig;
use pathmend_core::{EntryId, ROOT_PARENT, StorageId};
use pathmend_metadata::models::{EntryRow, NewEntry};
use pathmend_metadata::{EntryRepo, EntryTransaction, MetadataStore, SqliteStore};
use pathmend_repair::{CollectingOutput, RepairReport, Repairer};
use std::sync::Arc;
use tempfile::TempDir;

/// A SQLite entry table in a temporary directory, removed on drop.
#[allow(dead_code)]
pub struct TestTable {
    pub store: Arc<dyn MetadataStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestTable {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = SqliteStore::new(temp_dir.path().join("namespace.db"), "filecache", None)
            .await
            .expect("Failed to open SQLite store");
        Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        }
    }

    /// Insert an entry the way a well-behaved writer would.
    pub async fn insert(&self, storage: StorageId, path: &str, parent: EntryId) -> EntryId {
        self.store
            .insert_entry(&NewEntry::new(storage, path, parent))
            .await
            .expect("Insert entry failed")
    }

    /// Insert a storage root.
    pub async fn root(&self, storage: StorageId) -> EntryId {
        self.insert(storage, "", ROOT_PARENT).await
    }

    pub async fn get(&self, id: EntryId) -> Option<EntryRow> {
        self.store.get_entry(id).await.expect("Get entry failed")
    }

    pub async fn entry(&self, id: EntryId) -> EntryRow {
        self.get(id).await.expect("Entry should exist")
    }

    /// Repoint a parent without touching the cached path, as an interrupted move would.
    pub async fn set_parent(&self, id: EntryId, parent: EntryId) {
        let mut tx = self.store.begin().await.expect("Begin failed");
        tx.update_parent(id, parent).await.expect("Update parent failed");
        tx.commit().await.expect("Commit failed");
    }

    /// Overwrite the cached hash only, leaving path and storage as they are.
    pub async fn set_path_hash(&self, id: EntryId, hash: &str) {
        let entry = self.entry(id).await;
        let mut tx = self.store.begin().await.expect("Begin failed");
        tx.update_path_and_storage(id, &entry.path, hash, entry.storage_id)
            .await
            .expect("Update path failed");
        tx.commit().await.expect("Commit failed");
    }

    pub async fn run(&self, config: RepairConfig) -> (RepairReport, CollectingOutput) {
        let mut out = CollectingOutput::new();
        let report = Repairer::new(&*self.store, config)
            .run(&mut out)
            .await
            .expect("Repair failed");
        (report, out)
    }

    pub async fn repair(&self) -> (RepairReport, CollectingOutput) {
        self.run(RepairConfig::default()).await
    }

    /// Assert that `id` satisfies path coherence, parent resolvability and
    /// carries the hash of its own path.
    pub async fn assert_coherent(&self, id: EntryId) {
        let entry = self.entry(id).await;
        assert_eq!(
            entry.path_hash,
            pathmend_core::path_hash(&entry.path),
            "path hash of entry {id}"
        );
        if entry.parent == ROOT_PARENT {
            return;
        }
        assert_ne!(entry.parent, entry.id, "entry {id} is its own parent");
        let parent = self
            .get(entry.parent)
            .await
            .unwrap_or_else(|| panic!("parent of entry {id} is missing"));
        assert_eq!(entry.storage_id, parent.storage_id, "storage of entry {id}");
        let expected = pathmend_core::child_path(&parent.path, &entry.name);
        assert_eq!(entry.path, expected, "path of entry {id}");
    }
}
