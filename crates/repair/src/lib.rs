//! Path-cache consistency repair for pathmend.
//!
//! Two passes restore the entry table:
//! - [`MismatchFixer`] rewrites cached paths and storages that disagree with the parent
//! - [`OrphanFixer`] reattaches entries whose parent reference does not resolve
//!
//! [`Repairer`] sequences them to a fixed point and reports through an [`OutputSink`].

pub mod mismatch;
pub mod orphan;
pub mod output;
pub mod repairer;
pub mod report;

pub use mismatch::{MismatchFixer, MismatchOutcome};
pub use orphan::{OrphanFixer, OrphanOutcome};
pub use output::{CollectingOutput, OutputEvent, OutputSink, TracingOutput};
pub use repairer::Repairer;
pub use report::RepairReport;
