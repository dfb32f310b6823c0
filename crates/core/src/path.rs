//! Key and prefix helpers
//!
//! Remote keys always use `/` as separator regardless of the host platform.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Separator used in remote keys
pub const KEY_SEPARATOR: char = '/';

/// Normalize a prefix so it ends with exactly one separator
///
/// An empty prefix (or one made only of separators) stays empty.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches(KEY_SEPARATOR);
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}{KEY_SEPARATOR}")
    }
}

/// Join a prefix and a relative key
pub fn join_key(prefix: &str, name: &str) -> String {
    format!("{}{}", normalize_prefix(prefix), name.trim_start_matches(KEY_SEPARATOR))
}

/// Map a remote key onto a local path under `root`
///
/// Rejects keys that would escape `root` (absolute keys, `..` components).
pub fn key_to_local_path(root: &Path, key: &str) -> Result<PathBuf> {
    let relative = Path::new(key.trim_start_matches(KEY_SEPARATOR));

    let mut path = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::InvalidPath(format!(
                    "key '{key}' cannot be mapped to a local path"
                )));
            }
        }
    }

    if path == root {
        return Err(Error::InvalidPath(format!("key '{key}' is empty")));
    }

    Ok(path)
}

/// Whether a key denotes a folder placeholder object
pub fn is_folder_key(key: &str) -> bool {
    key.ends_with(KEY_SEPARATOR)
}
