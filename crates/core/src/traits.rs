//! ObjectStore trait definition
//!
//! This trait defines the interface for object-storage operations.
//! It allows the core library to be independent of the specific S3 SDK used.

use async_trait::async_trait;
use bytes::Bytes;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lifecycle::LifecycleRule;

/// Maximum number of keys a store accepts in one batch delete request
pub const MAX_DELETE_BATCH: usize = 1000;

/// An object as reported by a listing
///
/// This is a snapshot of remote state; it may be stale by the time it is acted upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Object key
    pub name: String,

    /// Last modification time
    pub last_modified: Timestamp,

    /// Size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

impl RemoteObject {
    pub fn new(name: impl Into<String>, last_modified: Timestamp) -> Self {
        Self {
            name: name.into(),
            last_modified,
            size: None,
        }
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }
}

/// Bucket entry returned by `list_buckets`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<Timestamp>,
}

/// Options for one listing request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Only return keys starting with this prefix
    pub prefix: Option<String>,

    /// Return keys after this marker
    pub marker: Option<String>,

    /// Group keys sharing a prefix up to this delimiter into common prefixes
    pub delimiter: Option<String>,

    /// Maximum number of keys in one page
    pub max_keys: Option<i32>,
}

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListResult {
    /// Objects in this page
    pub objects: Vec<RemoteObject>,

    /// Common prefixes (only when a delimiter was given)
    pub common_prefixes: Vec<String>,

    /// Marker for the next page; `None` when the listing is complete
    pub next_marker: Option<String>,
}

/// Acknowledgement of a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutReceipt {
    pub key: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// A key the store refused to delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFailure {
    pub key: String,
    pub message: String,
}

/// Per-key outcome of a batch delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub deleted: Vec<String>,
    pub failed: Vec<DeleteFailure>,
}

impl DeleteResult {
    /// Every key was deleted
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn absorb(&mut self, other: DeleteResult) {
        self.deleted.extend(other.deleted);
        self.failed.extend(other.failed);
    }
}

/// An acknowledged part of a multipart upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    /// 1-based part number
    pub part_number: i32,
    pub etag: String,
}

/// Object-storage capability set consumed by the engines
///
/// Object and lifecycle operations act on the bucket the implementation was
/// configured with; bucket operations take the bucket name explicitly.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List all buckets owned by the credentials
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    /// Create a bucket
    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    /// Delete an (empty) bucket
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    /// List one page of objects
    async fn list_objects(&self, options: ListOptions) -> Result<ListResult>;

    /// Fetch the content of an object
    async fn get_object(&self, key: &str) -> Result<Bytes>;

    /// Store an object in a single request
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<String>,
    ) -> Result<PutReceipt>;

    /// Delete a batch of keys
    ///
    /// Keys the store rejects individually are reported in the result; only a
    /// failure of the request as a whole is an error.
    async fn delete_objects(&self, keys: Vec<String>) -> Result<DeleteResult>;

    /// Server-side copy inside the bucket
    async fn copy_object(&self, src_key: &str, dst_key: &str) -> Result<PutReceipt>;

    /// Start a multipart upload, returning its upload id
    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: Option<String>,
    ) -> Result<String>;

    /// Upload one part of a multipart upload
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<CompletedPart>;

    /// Assemble the acknowledged parts into the final object
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<PutReceipt>;

    /// Discard a multipart upload and its parts
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()>;

    /// Fetch the bucket lifecycle rules (empty when none are configured)
    async fn get_bucket_lifecycle(&self) -> Result<Vec<LifecycleRule>>;

    /// Replace the bucket lifecycle rules
    async fn put_bucket_lifecycle(&self, rules: Vec<LifecycleRule>) -> Result<()>;

    /// Remove the bucket lifecycle configuration
    async fn delete_bucket_lifecycle(&self) -> Result<()>;
}

/// List every object matching `options`, following markers until the listing is complete
pub async fn list_all_objects<S>(store: &S, options: ListOptions) -> Result<Vec<RemoteObject>>
where
    S: ObjectStore + ?Sized,
{
    let mut objects = Vec::new();
    let mut marker = options.marker.clone();

    loop {
        let page = store
            .list_objects(ListOptions {
                marker: marker.clone(),
                ..options.clone()
            })
            .await?;

        tracing::debug!(
            prefix = options.prefix.as_deref().unwrap_or(""),
            count = page.objects.len(),
            next_marker = page.next_marker.as_deref().unwrap_or(""),
            "Listed page"
        );
        objects.extend(page.objects);

        match page.next_marker {
            Some(next) if marker.as_deref() == Some(next.as_str()) => {
                return Err(Error::Network(format!(
                    "listing did not advance past marker '{next}'"
                )));
            }
            Some(next) => marker = Some(next),
            None => break,
        }
    }

    Ok(objects)
}

/// Delete keys in batches the store accepts, collecting the per-key outcomes
pub async fn delete_all<S>(store: &S, keys: Vec<String>) -> Result<DeleteResult>
where
    S: ObjectStore + ?Sized,
{
    let mut result = DeleteResult::default();
    for batch in keys.chunks(MAX_DELETE_BATCH) {
        result.absorb(store.delete_objects(batch.to_vec()).await?);
    }
    if !result.is_complete() {
        tracing::warn!(
            deleted = result.deleted.len(),
            failed = result.failed.len(),
            "Some objects were not deleted"
        );
    }
    Ok(result)
}
