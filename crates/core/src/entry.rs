//! Namespace entry model and path helpers.
//!
//! Entries live in a flat table: each row carries a parent pointer plus a
//! denormalized copy of its full path. The helpers here compute the values the
//! cached columns are expected to hold.

use md5::{Digest, Md5};

/// Entry identity.
pub type EntryId = i64;

/// Storage backend identity.
pub type StorageId = i64;

/// Parent value carried by storage roots.
pub const ROOT_PARENT: EntryId = -1;

/// Path separator used in cached paths.
pub const SEPARATOR: char = '/';

/// Returns true if `parent` is the root sentinel.
pub fn is_root_parent(parent: EntryId) -> bool {
    parent == ROOT_PARENT
}

/// Compute the path hash stored alongside `path` (lowercase hex MD5).
pub fn path_hash(path: &str) -> String {
    let digest = Md5::digest(path.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Path of a child named `name` under a parent at `parent_path`.
///
/// Children of a storage root (empty path) have no leading separator.
pub fn child_path(parent_path: &str, name: &str) -> String {
    if parent_path.is_empty() {
        name.to_string()
    } else {
        format!("{parent_path}{SEPARATOR}{name}")
    }
}

/// Directory part of `path`, or the empty root path when there is no separator.
pub fn parent_path(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Last component of `path`.
pub fn base_name(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}
