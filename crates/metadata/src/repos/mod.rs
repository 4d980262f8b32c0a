//! Repository traits for entry operations.

pub mod entries;

pub use entries::{EntryRepo, EntryTransaction};
