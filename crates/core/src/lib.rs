//! Core domain types and shared logic for the pathmend repair engine.
//!
//! This crate defines what the other crates agree on:
//! - Entry identities and the root parent sentinel
//! - Path arithmetic (`parent_path`, `child_path`) and the cached path hash
//! - Configuration for the entry store and the repair run

pub mod config;
pub mod entry;
pub mod error;

pub use entry::{EntryId, ROOT_PARENT, StorageId, child_path, parent_path, path_hash};
pub use error::{Error, Result};

/// Default number of rows fetched per repair round.
pub const DEFAULT_CHUNK_SIZE: u32 = 200;

/// Default number of ids listed per unrepairable-orphan warning.
pub const DEFAULT_WARNING_BATCH_SIZE: usize = 100;

/// Default entry table name.
pub const DEFAULT_TABLE: &str = "filecache";

/// Validate that `name` is a plain SQL identifier safe to splice into queries.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid && name.len() <= 63 {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}
