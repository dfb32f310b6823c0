//! ot-core: Core library for the oss-tool object-storage client
//!
//! This crate provides the core functionality for oss-tool, including:
//! - Configuration loading and merging
//! - ObjectStore trait for object-storage operations
//! - Local path walking, upload and download engines
//! - Retention selection and lifecycle-rule editing
//!
//! This crate is designed to be independent of any specific S3 SDK,
//! allowing for easy testing and potential future support for other backends.

pub mod batch;
pub mod config;
pub mod download;
pub mod error;
pub mod lifecycle;
pub mod path;
pub mod retention;
pub mod retry;
pub mod traits;
pub mod upload;
pub mod walker;

pub use batch::{BatchReport, ItemOutcome, run_bounded};
pub use config::{
    ConfigFile, ConfigOverrides, Connection, EffectiveConfig, RetryConfig, TransferConfig,
};
pub use download::DownloadEngine;
pub use error::{Error, Result};
pub use lifecycle::{Expiration, LifecycleEditor, LifecycleRule, RuleStatus};
pub use path::{join_key, normalize_prefix};
pub use retention::{RetentionPolicy, parse_expire_date};
pub use retry::{is_resumable_error, retry_resumable};
pub use traits::{
    BucketInfo, CompletedPart, DeleteFailure, DeleteResult, ListOptions, ListResult, ObjectStore,
    PutReceipt, RemoteObject,
};
pub use upload::{UploadEngine, UploadEvent, UploadObserver, UploadReceipt};
pub use walker::{UploadTask, walk};
