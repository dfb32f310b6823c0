//! Local path enumeration
//!
//! Turns a local file or directory into upload tasks. A directory contributes
//! its own name to the remote key, so `walk("photos", "p/")` produces keys
//! like `p/photos/2024/a.jpg`.
//!
//! Entries are visited in file-name order. Symlinks are followed; a link that
//! points back to one of its ancestors is reported instead of being walked.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::path::{KEY_SEPARATOR, join_key, normalize_prefix};

/// One local file to store under a remote key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub local_path: PathBuf,
    pub remote_key: String,
    pub size_bytes: u64,
}

/// Lazy sequence of upload tasks for one local path
///
/// Items that cannot be uploaded (missing paths, special files, symlink loops)
/// come out as `Err` and do not stop the walk.
pub struct PathWalker {
    inner: walkdir::IntoIter,
    root: PathBuf,
    file_prefix: String,
    dir_prefix: String,
}

/// Enumerate `local_path` into upload tasks under `prefix`
pub fn walk(local_path: impl AsRef<Path>, prefix: &str) -> PathWalker {
    let root = local_path.as_ref().to_path_buf();
    let file_prefix = normalize_prefix(prefix);

    let dir_prefix = match root.file_name() {
        Some(name) => normalize_prefix(&join_key(&file_prefix, &name.to_string_lossy())),
        None => file_prefix.clone(),
    };

    let inner = WalkDir::new(&root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();

    PathWalker {
        inner,
        root,
        file_prefix,
        dir_prefix,
    }
}

impl PathWalker {
    fn task_for(&self, entry: &DirEntry) -> Result<UploadTask> {
        let size_bytes = entry
            .metadata()
            .map_err(|e| self.walk_error(e))?
            .len();

        let remote_key = if entry.depth() == 0 {
            join_key(&self.file_prefix, &entry.file_name().to_string_lossy())
        } else {
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|_| Error::InvalidPath(entry.path().display().to_string()))?;
            let relative: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            join_key(&self.dir_prefix, &relative.join(&KEY_SEPARATOR.to_string()))
        };

        Ok(UploadTask {
            local_path: entry.path().to_path_buf(),
            remote_key,
            size_bytes,
        })
    }

    fn walk_error(&self, error: walkdir::Error) -> Error {
        let path = error
            .path()
            .unwrap_or(self.root.as_path())
            .display()
            .to_string();

        if let Some(ancestor) = error.loop_ancestor() {
            return Error::InvalidPath(format!(
                "{path}: symlink loop back to {}",
                ancestor.display()
            ));
        }

        let kind = error.io_error().map(|e| e.kind());
        match kind {
            Some(std::io::ErrorKind::NotFound) => Error::LocalPathNotFound(path),
            _ => Error::Io(std::io::Error::from(error)),
        }
    }
}

impl Iterator for PathWalker {
    type Item = Result<UploadTask>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let error = self.walk_error(e);
                    tracing::warn!(error = %error, "Skipping local entry");
                    return Some(Err(error));
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }

            if !file_type.is_file() {
                let path = entry.path().display().to_string();
                tracing::warn!(path = %path, "Skipping special file");
                return Some(Err(Error::InvalidPath(format!("{path}: not a regular file"))));
            }

            return Some(self.task_for(&entry));
        }
    }
}
