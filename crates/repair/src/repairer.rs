//! Repair orchestration.

use crate::mismatch::MismatchFixer;
use crate::orphan::OrphanFixer;
use crate::output::OutputSink;
use crate::report::RepairReport;
use pathmend_core::EntryId;
use pathmend_core::config::RepairConfig;
use pathmend_metadata::{EntryRepo, MetadataResult};

/// Runs the path-mismatch and orphan-parent passes to a common fixed point.
///
/// Reparenting an orphan can make it path-mismatched against its new
/// parent, so the pair of passes repeats for as long as the orphan pass
/// still fixes entries.
pub struct Repairer<'a, R: EntryRepo + ?Sized> {
    repo: &'a R,
    config: RepairConfig,
}

impl<'a, R: EntryRepo + ?Sized> Repairer<'a, R> {
    pub fn new(repo: &'a R, config: RepairConfig) -> Self {
        Self { repo, config }
    }

    pub fn config(&self) -> &RepairConfig {
        &self.config
    }

    pub async fn run(&self, out: &mut dyn OutputSink) -> MetadataResult<RepairReport> {
        let scope = self.config.storage_id;
        let mut report = RepairReport {
            dry_run: self.config.dry_run,
            mismatches_detected: self.repo.count_mismatches(scope).await?,
            orphans_detected: self.repo.count_orphans(scope).await?,
            ..Default::default()
        };

        tracing::info!(
            mismatches = report.mismatches_detected,
            orphans = report.orphans_detected,
            storage_id = ?scope,
            dry_run = self.config.dry_run,
            "Scanned entry table"
        );

        if self.config.dry_run {
            out.info(&format!(
                "Found {} entries with wrong path",
                report.mismatches_detected
            ));
            out.info(&format!(
                "Found {} entries with unresolvable parent",
                report.orphans_detected
            ));
            return Ok(report);
        }

        out.start_progress(report.mismatches_detected);

        let mismatch = MismatchFixer::new(self.repo, &self.config);
        let orphan = OrphanFixer::new(self.repo, &self.config);

        loop {
            report.passes += 1;

            let paths = mismatch.run(out).await?;
            report.paths_fixed += paths.fixed;
            report.replaced_entries.extend(paths.replaced);
            report.rounds += paths.rounds;
            report.parent_cycles = paths.parent_cycles;

            let parents = orphan.run(out).await?;
            report.parents_fixed += parents.reparented;
            report.rounds += parents.rounds;
            report.unrepairable = parents.unrepairable;

            if paths.round_limit_hit || parents.round_limit_hit {
                report.round_limit_hit = true;
                break;
            }
            if parents.reparented == 0 {
                break;
            }
            if report.passes >= self.config.max_rounds {
                report.round_limit_hit = true;
                out.warning(&format!(
                    "Repair stopped after {} passes while parents were still being fixed",
                    report.passes
                ));
                break;
            }
            tracing::debug!(pass = report.passes, "Parents fixed, rescanning paths");
        }

        out.finish_progress();

        for chunk in report.unrepairable.chunks(self.config.warning_batch_size.max(1)) {
            out.warning(&format!(
                "Entries with unresolvable parent left untouched: ids {}",
                join_ids(chunk)
            ));
        }

        for chunk in report.parent_cycles.chunks(self.config.warning_batch_size.max(1)) {
            out.warning(&format!(
                "Entries inside a parent cycle left untouched: ids {}",
                join_ids(chunk)
            ));
        }

        let total = report.total_fixed();
        if total > 0 {
            out.info(&format!(
                "Fixed {total} entries in total, run a full file scan to refresh the cache"
            ));
        }

        tracing::info!(
            paths_fixed = report.paths_fixed,
            parents_fixed = report.parents_fixed,
            replaced = report.replaced_entries.len(),
            unrepairable = report.unrepairable.len(),
            parent_cycles = report.parent_cycles.len(),
            passes = report.passes,
            "Repair complete"
        );

        Ok(report)
    }
}

fn join_ids(ids: &[EntryId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
