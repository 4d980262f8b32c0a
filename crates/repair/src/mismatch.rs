//! Path-mismatch pass.
//!
//! Rewrites the cached path and storage of entries whose parent resolves but
//! disagrees with them. The pass sweeps the detection query in id order and
//! starts another sweep for as long as the previous one fixed anything, so
//! children of an entry fixed late in a sweep are picked up by the next one.

use crate::output::OutputSink;
use pathmend_core::config::RepairConfig;
use pathmend_core::{EntryId, ROOT_PARENT, StorageId};
use pathmend_metadata::models::MismatchRow;
use pathmend_metadata::{EntryRepo, EntryTransaction, MetadataResult};
use std::collections::BTreeSet;

/// Result of one path-mismatch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MismatchOutcome {
    /// Entries whose path or storage was rewritten.
    pub fixed: u64,
    /// Occupants deleted to make room for a corrected path.
    pub replaced: Vec<EntryId>,
    /// Entries that are an ancestor of their own parent, left untouched, ascending.
    pub parent_cycles: Vec<EntryId>,
    /// Detection rounds that returned rows.
    pub rounds: u64,
    /// The pass stopped at the round ceiling with rows left.
    pub round_limit_hit: bool,
}

/// What happened to a single detected row.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RowFix {
    Fixed {
        old_path: String,
        new_path: String,
        old_storage: StorageId,
        new_storage: StorageId,
        replaced: Option<EntryId>,
    },
    /// Following parents from the row leads back to the row.
    Cycle,
    /// The row changed after the batch was read; the next sweep sees it fresh.
    Stale,
}

pub struct MismatchFixer<'a, R: EntryRepo + ?Sized> {
    repo: &'a R,
    chunk_size: u32,
    max_rounds: u64,
    storage_id: Option<StorageId>,
}

impl<'a, R: EntryRepo + ?Sized> MismatchFixer<'a, R> {
    pub fn new(repo: &'a R, config: &RepairConfig) -> Self {
        Self {
            repo,
            chunk_size: config.chunk_size,
            max_rounds: config.max_rounds,
            storage_id: config.storage_id,
        }
    }

    /// Sweep until a full sweep fixes nothing or the round ceiling is reached.
    pub async fn run(&self, out: &mut dyn OutputSink) -> MetadataResult<MismatchOutcome> {
        let mut outcome = MismatchOutcome::default();
        let mut cycles: BTreeSet<EntryId> = BTreeSet::new();

        'sweeps: loop {
            let mut after: Option<EntryId> = None;
            let mut fixed_in_sweep = 0u64;

            loop {
                let rows = self
                    .repo
                    .find_mismatched_paths(self.chunk_size, after, self.storage_id)
                    .await?;
                let Some(last) = rows.last() else {
                    break;
                };
                after = Some(last.id);

                if outcome.rounds >= self.max_rounds {
                    outcome.round_limit_hit = true;
                    tracing::warn!(
                        rounds = outcome.rounds,
                        remaining = rows.len(),
                        "Path repair exceeded max rounds"
                    );
                    out.warning(&format!(
                        "Path repair stopped after {} rounds with entries still mismatched",
                        outcome.rounds
                    ));
                    break 'sweeps;
                }
                outcome.rounds += 1;

                tracing::debug!(
                    round = outcome.rounds,
                    batch = rows.len(),
                    "Fixing mismatched paths"
                );

                for row in &rows {
                    match self.fix_row(row).await? {
                        RowFix::Fixed {
                            old_path,
                            new_path,
                            old_storage,
                            new_storage,
                            replaced,
                        } => {
                            outcome.fixed += 1;
                            fixed_in_sweep += 1;
                            let mut message = format!(
                                "Fixed entry {}, set wrong path \"{}\" to \"{}\"",
                                row.id, old_path, new_path
                            );
                            if old_storage != new_storage {
                                message.push_str(&format!(
                                    ", moved from storage {old_storage} to {new_storage}"
                                ));
                            }
                            if let Some(occupant) = replaced {
                                outcome.replaced.push(occupant);
                                message.push_str(" (replaced an existing entry)");
                            }
                            out.advance(1, &message);
                        }
                        RowFix::Cycle => {
                            if cycles.insert(row.id) {
                                tracing::warn!(
                                    entry_id = row.id,
                                    path = %row.path,
                                    "Entry is an ancestor of its own parent, leaving it untouched"
                                );
                            }
                        }
                        RowFix::Stale => {
                            tracing::trace!(
                                entry_id = row.id,
                                "Entry changed since detection, deferring"
                            );
                        }
                    }
                }
            }

            if fixed_in_sweep == 0 {
                break;
            }
        }

        if outcome.fixed > 0 {
            out.info(&format!("Fixed {} entries with wrong path", outcome.fixed));
        }
        outcome.parent_cycles = cycles.into_iter().collect();
        Ok(outcome)
    }

    /// Fix one row in its own transaction.
    ///
    /// The row and its parent are re-read inside the transaction and the
    /// target path is computed from the parent as it is now, not as it was
    /// when the batch was read.
    async fn fix_row(&self, row: &MismatchRow) -> MetadataResult<RowFix> {
        let mut tx = self.repo.begin().await?;

        let Some(entry) = tx.get_entry(row.id).await? else {
            return Ok(RowFix::Stale);
        };
        if entry.path != row.path || entry.storage_id != row.storage_id || entry.parent == entry.id
        {
            return Ok(RowFix::Stale);
        }
        let Some(parent) = tx.get_entry(entry.parent).await? else {
            return Ok(RowFix::Stale);
        };
        if parent.path.is_empty() {
            return Ok(RowFix::Stale);
        }

        let new_path = pathmend_core::child_path(&parent.path, &entry.name);
        let new_storage = parent.storage_id;
        if new_path == entry.path && new_storage == entry.storage_id {
            return Ok(RowFix::Stale);
        }

        if is_ancestor_of(tx.as_mut(), entry.id, parent.id).await? {
            return Ok(RowFix::Cycle);
        }

        let occupant = tx
            .find_entry_by_storage_and_path(new_storage, &new_path)
            .await?
            .filter(|&id| id != entry.id);
        let mut replaced = None;
        if let Some(occupant) = occupant {
            let deleted = tx.delete_entry(new_storage, &new_path).await?;
            tracing::warn!(
                entry_id = entry.id,
                occupant_id = occupant,
                deleted = deleted,
                storage_id = new_storage,
                path = %new_path,
                "Deleted entry occupying the corrected path"
            );
            replaced = Some(occupant);
        }

        tx.update_path_and_storage(
            entry.id,
            &new_path,
            &pathmend_core::path_hash(&new_path),
            new_storage,
        )
        .await?;
        tx.commit().await?;

        tracing::debug!(
            entry_id = entry.id,
            old_path = %entry.path,
            new_path = %new_path,
            storage_id = new_storage,
            "Fixed entry path"
        );

        Ok(RowFix::Fixed {
            old_path: entry.path,
            new_path,
            old_storage: entry.storage_id,
            new_storage,
            replaced,
        })
    }
}

/// Whether `ancestor` is reached by following parent links upward from `start`.
///
/// Stops at the root sentinel, a missing row, or a loop that does not pass
/// through `ancestor`.
async fn is_ancestor_of(
    tx: &mut (dyn EntryTransaction + 'static),
    ancestor: EntryId,
    start: EntryId,
) -> MetadataResult<bool> {
    let mut seen = BTreeSet::new();
    let mut current = start;
    while current != ROOT_PARENT && seen.insert(current) {
        if current == ancestor {
            return Ok(true);
        }
        match tx.get_entry(current).await? {
            Some(row) => current = row.parent,
            None => break,
        }
    }
    Ok(false)
}
