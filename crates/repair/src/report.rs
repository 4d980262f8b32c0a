//! Summary of a repair run.

use pathmend_core::EntryId;
use serde::{Deserialize, Serialize};

/// Counts and ids collected over a whole run, printed as JSON by the binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    /// Detection only, nothing was modified.
    pub dry_run: bool,
    /// Path-mismatched entries found before repairing.
    pub mismatches_detected: u64,
    /// Orphaned entries found before repairing.
    pub orphans_detected: u64,
    pub paths_fixed: u64,
    pub parents_fixed: u64,
    /// Occupants deleted to make room for corrected paths.
    pub replaced_entries: Vec<EntryId>,
    /// Orphans left untouched because no parent could be located.
    pub unrepairable: Vec<EntryId>,
    /// Mismatched entries left untouched because they sit inside a parent cycle.
    pub parent_cycles: Vec<EntryId>,
    /// Mismatch pass followed by orphan pass, repeated while parents were fixed.
    pub passes: u64,
    /// Detection rounds over all passes.
    pub rounds: u64,
    pub round_limit_hit: bool,
}

impl RepairReport {
    pub fn total_fixed(&self) -> u64 {
        self.paths_fixed + self.parents_fixed
    }

    /// Whether the run ended with something the operator should look at.
    ///
    /// A dry run warns when it found anything to repair.
    pub fn has_warnings(&self) -> bool {
        if self.dry_run {
            return self.mismatches_detected > 0 || self.orphans_detected > 0;
        }
        self.round_limit_hit || !self.unrepairable.is_empty() || !self.parent_cycles.is_empty()
    }
}
