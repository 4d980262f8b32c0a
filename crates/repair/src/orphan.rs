//! Orphan-parent pass.
//!
//! Entries whose parent reference is dangling or points at themselves are
//! reattached to the entry found at the directory part of their own cached
//! path. Entries with no such entry are skipped by the detection cursor and
//! reported, never modified.

use crate::output::OutputSink;
use pathmend_core::config::RepairConfig;
use pathmend_core::{EntryId, StorageId};
use pathmend_metadata::models::OrphanRow;
use pathmend_metadata::{EntryRepo, MetadataResult};
use std::collections::BTreeSet;

/// Result of one orphan-parent pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrphanOutcome {
    /// Entries given a new parent.
    pub reparented: u64,
    /// Entries left untouched because no parent could be located, ascending.
    pub unrepairable: Vec<EntryId>,
    /// Detection rounds that returned rows.
    pub rounds: u64,
    pub round_limit_hit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowFix {
    Reparented { old_parent: EntryId, new_parent: EntryId },
    Unrepairable,
    Stale,
}

pub struct OrphanFixer<'a, R: EntryRepo + ?Sized> {
    repo: &'a R,
    chunk_size: u32,
    max_rounds: u64,
    storage_id: Option<StorageId>,
}

impl<'a, R: EntryRepo + ?Sized> OrphanFixer<'a, R> {
    pub fn new(repo: &'a R, config: &RepairConfig) -> Self {
        Self {
            repo,
            chunk_size: config.chunk_size,
            max_rounds: config.max_rounds,
            storage_id: config.storage_id,
        }
    }

    /// Walk the orphans in id order until detection past the cursor comes
    /// back empty.
    ///
    /// The cursor moves past entries found unrepairable, so they are never
    /// sent back to the database. Reattaching an entry never orphans another
    /// one, so a single walk covers the table.
    pub async fn run(&self, out: &mut dyn OutputSink) -> MetadataResult<OrphanOutcome> {
        let mut outcome = OrphanOutcome::default();
        let mut excluded: BTreeSet<EntryId> = BTreeSet::new();
        let mut after: Option<EntryId> = None;

        loop {
            let rows = self
                .repo
                .find_orphan_parents(self.chunk_size, after, self.storage_id)
                .await?;
            let Some(last) = rows.last() else {
                break;
            };

            if outcome.rounds >= self.max_rounds {
                outcome.round_limit_hit = true;
                tracing::warn!(
                    rounds = outcome.rounds,
                    remaining = rows.len(),
                    "Parent repair exceeded max rounds"
                );
                out.warning(&format!(
                    "Parent repair stopped after {} rounds with orphaned entries left",
                    outcome.rounds
                ));
                break;
            }
            outcome.rounds += 1;

            tracing::debug!(
                round = outcome.rounds,
                batch = rows.len(),
                excluded = excluded.len(),
                "Fixing orphaned entries"
            );

            let mut first_stale: Option<EntryId> = None;
            for row in &rows {
                if excluded.contains(&row.id) {
                    continue;
                }
                match self.fix_row(row).await? {
                    RowFix::Reparented {
                        old_parent,
                        new_parent,
                    } => {
                        outcome.reparented += 1;
                        out.advance(
                            1,
                            &format!(
                                "Fixed entry {}, set wrong parent {} to {}",
                                row.id, old_parent, new_parent
                            ),
                        );
                    }
                    RowFix::Unrepairable => {
                        tracing::debug!(
                            entry_id = row.id,
                            storage_id = row.storage_id,
                            path = %row.path,
                            "No parent found for orphaned entry"
                        );
                        excluded.insert(row.id);
                    }
                    RowFix::Stale => {
                        tracing::trace!(entry_id = row.id, "Entry changed since detection, deferring");
                        first_stale.get_or_insert(row.id);
                    }
                }
            }

            // Rows read stale are read again from where the first one sits.
            after = Some(match first_stale {
                Some(id) => id - 1,
                None => last.id,
            });
        }

        if outcome.reparented > 0 {
            out.info(&format!(
                "Fixed {} entries with unresolvable parent",
                outcome.reparented
            ));
        }
        outcome.unrepairable = excluded.into_iter().collect();
        Ok(outcome)
    }

    /// Reattach one row in its own transaction.
    async fn fix_row(&self, row: &OrphanRow) -> MetadataResult<RowFix> {
        let mut tx = self.repo.begin().await?;

        let Some(entry) = tx.get_entry(row.id).await? else {
            return Ok(RowFix::Stale);
        };
        if entry.parent != row.parent || entry.path != row.path {
            return Ok(RowFix::Stale);
        }
        // A storage root has nowhere to look for a parent.
        if entry.path.is_empty() {
            return Ok(RowFix::Unrepairable);
        }

        let parent_path = pathmend_core::parent_path(&entry.path);
        let found = tx
            .find_entry_by_storage_and_path(entry.storage_id, parent_path)
            .await?;
        let new_parent = match found {
            Some(id) if id != entry.id => id,
            _ => return Ok(RowFix::Unrepairable),
        };

        tx.update_parent(entry.id, new_parent).await?;
        tx.commit().await?;

        tracing::debug!(
            entry_id = entry.id,
            old_parent = entry.parent,
            new_parent = new_parent,
            "Fixed entry parent"
        );

        Ok(RowFix::Reparented {
            old_parent: entry.parent,
            new_parent,
        })
    }
}
