//! ot-s3: S3 SDK adapter for oss-tool
//!
//! Implements the `ObjectStore` trait from ot-core on top of aws-sdk-s3.
//! Any S3-compatible service (AWS, Aliyun OSS, MinIO, ...) can be used by
//! pointing the endpoint at it.

mod client;

pub use client::S3Client;
