//! Download engine
//!
//! Mirrors remote keys onto the local file system below a root directory.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::path::{is_folder_key, key_to_local_path, normalize_prefix};
use crate::traits::{ListOptions, ObjectStore, list_all_objects};

/// Fetches objects into mirrored local paths
pub struct DownloadEngine<S: ObjectStore + ?Sized> {
    store: Arc<S>,
    root: PathBuf,
}

impl<S: ObjectStore + ?Sized> DownloadEngine<S> {
    pub fn new(store: Arc<S>, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            root: root.into(),
        }
    }

    /// Download every object under `prefix`, stopping at the first failure
    ///
    /// Returns the number of objects fetched. Folder placeholder keys only
    /// create their directory and are not counted.
    pub async fn download_prefix(&self, prefix: &str) -> Result<usize> {
        let prefix = normalize_prefix(prefix);
        let options = ListOptions {
            prefix: (!prefix.is_empty()).then(|| prefix.clone()),
            ..Default::default()
        };

        let objects = list_all_objects(self.store.as_ref(), options).await?;
        tracing::debug!(prefix = %prefix, count = objects.len(), "Downloading prefix");

        let mut fetched = 0;
        for object in &objects {
            if !is_folder_key(&object.name) {
                fetched += 1;
            }
            self.download_object(&object.name).await?;
        }

        Ok(fetched)
    }

    /// Download one key, returning the local path written
    pub async fn download_object(&self, key: &str) -> Result<PathBuf> {
        let path = key_to_local_path(&self.root, key)?;

        if is_folder_key(key) {
            tokio::fs::create_dir_all(&path).await?;
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = self.store.get_object(key).await?;
        tokio::fs::write(&path, &data).await?;

        tracing::info!(key, path = %path.display(), size = data.len(), "Downloaded object");
        Ok(path)
    }
}
