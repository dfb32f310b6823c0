//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from ot-core.

use async_trait::async_trait;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLifecycleConfiguration, CompletedMultipartUpload, Delete, ExpirationStatus,
    LifecycleExpiration, LifecycleRuleFilter, ObjectIdentifier,
};
use aws_smithy_types::DateTime;
use bytes::Bytes;
use jiff::Timestamp;
use jiff::tz::TimeZone;
use ot_core::{
    BucketInfo, CompletedPart, Connection, DeleteFailure, DeleteResult, Error, Expiration,
    LifecycleRule, ListOptions, ListResult, ObjectStore, PutReceipt, RemoteObject, Result,
    RuleStatus,
};

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    bucket: Option<String>,
}

impl S3Client {
    /// Create a new S3 client from resolved connection parameters
    pub async fn new(connection: &Connection) -> Result<Self> {
        let credentials = aws_credential_types::Credentials::new(
            connection.access_key_id.clone(),
            connection.access_key_secret.clone(),
            None, // session token
            None, // expiry
            "oss-tool-static-credentials",
        );

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(connection.region.clone()))
            .endpoint_url(&connection.endpoint)
            .load()
            .await;

        // Local and IP endpoints (MinIO and friends) cannot serve virtual-hosted buckets
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(uses_path_style(&connection.endpoint))
            .build();

        tracing::debug!(
            endpoint = %connection.endpoint,
            region = %connection.region,
            bucket = connection.bucket.as_deref().unwrap_or(""),
            "S3 client configured"
        );

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: connection.bucket.clone(),
        })
    }

    /// Bucket used by object and lifecycle operations
    fn bucket(&self) -> Result<&str> {
        self.bucket
            .as_deref()
            .ok_or_else(|| Error::MissingArgument("bucket".to_string()))
    }

    /// Format AWS SDK error into a detailed error message
    fn format_sdk_error<E: std::fmt::Display>(error: &aws_sdk_s3::error::SdkError<E>) -> String {
        match error {
            aws_sdk_s3::error::SdkError::ServiceError(service_err) => {
                let err = service_err.err();
                let meta = service_err.raw();
                let mut msg = format!("Service error: {}", err);
                if let Some(code) = meta.headers().get("x-amz-error-code")
                    && let Ok(code_str) = std::str::from_utf8(code.as_bytes())
                {
                    msg.push_str(&format!(" (code: {})", code_str));
                }
                msg
            }
            aws_sdk_s3::error::SdkError::ConstructionFailure(err) => {
                format!("Request construction failed: {:?}", err)
            }
            aws_sdk_s3::error::SdkError::TimeoutError(_) => "Request timeout".to_string(),
            aws_sdk_s3::error::SdkError::DispatchFailure(err) => {
                format!("Network dispatch error: {:?}", err)
            }
            aws_sdk_s3::error::SdkError::ResponseError(err) => {
                format!("Response error: {:?}", err)
            }
            _ => error.to_string(),
        }
    }

    /// Map an SDK error to `NotFound(what)` for missing keys/buckets/uploads, `Network` otherwise
    fn map_sdk_error<E: std::fmt::Display>(
        error: aws_sdk_s3::error::SdkError<E>,
        what: impl FnOnce() -> String,
    ) -> Error {
        classify_error(Self::format_sdk_error(&error), what)
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let response = self
            .inner
            .list_buckets()
            .send()
            .await
            .map_err(|e| Error::Network(Self::format_sdk_error(&e)))?;

        let buckets = response
            .buckets()
            .iter()
            .map(|b| BucketInfo {
                name: b.name().unwrap_or_default().to_string(),
                created: b.creation_date().and_then(to_timestamp),
            })
            .collect();

        Ok(buckets)
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.inner
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| {
                let err_str = Self::format_sdk_error(&e);
                if err_str.contains("BucketAlreadyExists")
                    || err_str.contains("BucketAlreadyOwnedByYou")
                {
                    Error::Conflict(format!("Bucket already exists: {bucket}"))
                } else {
                    Error::Network(err_str)
                }
            })?;

        tracing::info!(bucket, "Bucket created");
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.inner
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, || format!("Bucket not found: {bucket}")))?;

        tracing::info!(bucket, "Bucket deleted");
        Ok(())
    }

    async fn list_objects(&self, options: ListOptions) -> Result<ListResult> {
        let bucket = self.bucket()?;
        let mut request = self.inner.list_objects().bucket(bucket);

        if let Some(prefix) = &options.prefix {
            request = request.prefix(prefix);
        }
        if let Some(marker) = &options.marker {
            request = request.marker(marker);
        }
        if let Some(delimiter) = &options.delimiter {
            request = request.delimiter(delimiter);
        }
        if let Some(max) = options.max_keys {
            request = request.max_keys(max);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, || format!("Bucket not found: {bucket}")))?;

        let objects: Vec<RemoteObject> = response
            .contents()
            .iter()
            .map(|object| {
                let last_modified = object
                    .last_modified()
                    .and_then(to_timestamp)
                    .unwrap_or(Timestamp::UNIX_EPOCH);
                let remote = RemoteObject::new(object.key().unwrap_or_default(), last_modified);
                match object.size() {
                    Some(size) => remote.with_size(size),
                    None => remote,
                }
            })
            .collect();

        let common_prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        let next_marker = page_marker(
            response.is_truncated().unwrap_or(false),
            response.next_marker(),
            objects.last().map(|o| o.name.as_str()),
        );

        Ok(ListResult {
            objects,
            common_prefixes,
            next_marker,
        })
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let bucket = self.bucket()?;
        let response = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, || format!("{bucket}/{key}")))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Network(e.to_string()))?
            .into_bytes();

        Ok(data)
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<String>,
    ) -> Result<PutReceipt> {
        let bucket = self.bucket()?;
        let mut request = self
            .inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data));

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(Self::format_sdk_error(&e)))?;

        Ok(PutReceipt {
            key: key.to_string(),
            etag: response.e_tag().map(trim_etag),
        })
    }

    async fn delete_objects(&self, keys: Vec<String>) -> Result<DeleteResult> {
        if keys.is_empty() {
            return Ok(DeleteResult::default());
        }
        let bucket = self.bucket()?;

        let objects = keys
            .iter()
            .map(|k| ObjectIdentifier::builder().key(k).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::General(e.to_string()))?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(false)
            .build()
            .map_err(|e| Error::General(e.to_string()))?;

        let response = self
            .inner
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| Error::Network(Self::format_sdk_error(&e)))?;

        let deleted: Vec<String> = response
            .deleted()
            .iter()
            .filter_map(|d| d.key().map(|k| k.to_string()))
            .collect();

        let failed: Vec<DeleteFailure> = response
            .errors()
            .iter()
            .map(|e| DeleteFailure {
                key: e.key().unwrap_or_default().to_string(),
                message: delete_error_message(e.code(), e.message()),
            })
            .collect();
        if !failed.is_empty() {
            tracing::debug!(count = failed.len(), "Store rejected some deletes");
        }

        Ok(DeleteResult { deleted, failed })
    }

    async fn copy_object(&self, src_key: &str, dst_key: &str) -> Result<PutReceipt> {
        let bucket = self.bucket()?;

        let response = self
            .inner
            .copy_object()
            .copy_source(copy_source(bucket, src_key))
            .bucket(bucket)
            .key(dst_key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, || format!("{bucket}/{src_key}")))?;

        Ok(PutReceipt {
            key: dst_key.to_string(),
            etag: response
                .copy_object_result()
                .and_then(|r| r.e_tag())
                .map(trim_etag),
        })
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: Option<String>,
    ) -> Result<String> {
        let bucket = self.bucket()?;
        let mut request = self.inner.create_multipart_upload().bucket(bucket).key(key);
        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(Self::format_sdk_error(&e)))?;

        response
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| Error::General(format!("no upload id returned for '{key}'")))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<CompletedPart> {
        let bucket = self.bucket()?;
        let response = self
            .inner
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, || format!("upload {upload_id} of '{key}'")))?;

        let etag = response
            .e_tag()
            .map(trim_etag)
            .ok_or_else(|| Error::General(format!("no etag returned for part {part_number}")))?;

        Ok(CompletedPart { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<PutReceipt> {
        let bucket = self.bucket()?;
        let parts = parts
            .into_iter()
            .map(|p| {
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(p.etag)
                    .build()
            })
            .collect();

        let response = self
            .inner
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, || format!("upload {upload_id} of '{key}'")))?;

        Ok(PutReceipt {
            key: key.to_string(),
            etag: response.e_tag().map(trim_etag),
        })
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        let bucket = self.bucket()?;
        self.inner
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, || format!("upload {upload_id} of '{key}'")))?;

        tracing::debug!(key, upload_id, "Multipart upload aborted");
        Ok(())
    }

    async fn get_bucket_lifecycle(&self) -> Result<Vec<LifecycleRule>> {
        let bucket = self.bucket()?;
        let response = match self
            .inner
            .get_bucket_lifecycle_configuration()
            .bucket(bucket)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if e.as_service_error().and_then(|se| se.code())
                    == Some("NoSuchLifecycleConfiguration")
                {
                    return Ok(vec![]);
                }
                return Err(Self::map_sdk_error(e, || format!("Bucket not found: {bucket}")));
            }
        };

        Ok(response.rules().iter().map(rule_from_sdk).collect())
    }

    async fn put_bucket_lifecycle(&self, rules: Vec<LifecycleRule>) -> Result<()> {
        let bucket = self.bucket()?;
        let rules = rules
            .iter()
            .map(rule_to_sdk)
            .collect::<Result<Vec<_>>>()?;

        let configuration = BucketLifecycleConfiguration::builder()
            .set_rules(Some(rules))
            .build()
            .map_err(|e| Error::General(e.to_string()))?;

        self.inner
            .put_bucket_lifecycle_configuration()
            .bucket(bucket)
            .lifecycle_configuration(configuration)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, || format!("Bucket not found: {bucket}")))?;

        Ok(())
    }

    async fn delete_bucket_lifecycle(&self) -> Result<()> {
        let bucket = self.bucket()?;
        self.inner
            .delete_bucket_lifecycle()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, || format!("Bucket not found: {bucket}")))?;

        Ok(())
    }
}

fn classify_error(message: String, what: impl FnOnce() -> String) -> Error {
    if message.contains("NotFound")
        || message.contains("NoSuchKey")
        || message.contains("NoSuchBucket")
        || message.contains("NoSuchUpload")
    {
        Error::NotFound(what())
    } else {
        Error::Network(message)
    }
}

fn to_timestamp(value: &DateTime) -> Option<Timestamp> {
    Timestamp::new(value.secs(), value.subsec_nanos() as i32).ok()
}

/// Human-readable reason for a key rejected by DeleteObjects
fn delete_error_message(code: Option<&str>, message: Option<&str>) -> String {
    match (code, message) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(text), None) | (None, Some(text)) => text.to_string(),
        (None, None) => "delete rejected".to_string(),
    }
}

fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

/// `x-amz-copy-source` value; the key is percent-encoded
fn copy_source(bucket: &str, key: &str) -> String {
    format!("{bucket}/{}", urlencoding::encode(key))
}

/// Marker for the page after this one
///
/// ListObjects only returns `NextMarker` when a delimiter is set; otherwise the
/// last key of a truncated page is the marker.
fn page_marker(truncated: bool, next_marker: Option<&str>, last_key: Option<&str>) -> Option<String> {
    if !truncated {
        return None;
    }
    next_marker
        .filter(|m| !m.is_empty())
        .or(last_key)
        .map(str::to_string)
}

fn uses_path_style(endpoint: &str) -> bool {
    let authority = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest)
        .split('/')
        .next()
        .unwrap_or_default();

    let host = match authority.strip_prefix('[') {
        Some(bracketed) => bracketed.split(']').next().unwrap_or_default(),
        None => authority.rsplit_once(':').map_or(authority, |(host, _)| host),
    };

    host == "localhost" || host.parse::<std::net::IpAddr>().is_ok()
}

fn rule_to_sdk(rule: &LifecycleRule) -> Result<aws_sdk_s3::types::LifecycleRule> {
    let status = match rule.status {
        RuleStatus::Enabled => ExpirationStatus::Enabled,
        RuleStatus::Disabled => ExpirationStatus::Disabled,
    };

    let expiration = match rule.expiration {
        Some(Expiration::Days(days)) => Some(
            LifecycleExpiration::builder()
                .days(i32::try_from(days).map_err(|_| {
                    Error::Config(format!("expiration days out of range: {days}"))
                })?)
                .build(),
        ),
        Some(Expiration::Date(date)) => {
            let midnight = date
                .to_zoned(TimeZone::UTC)
                .map_err(|e| Error::Config(format!("expiration date out of range: {e}")))?;
            Some(
                LifecycleExpiration::builder()
                    .date(DateTime::from_secs(midnight.timestamp().as_second()))
                    .build(),
            )
        }
        None => None,
    };

    aws_sdk_s3::types::LifecycleRule::builder()
        .id(&rule.id)
        .filter(LifecycleRuleFilter::builder().prefix(&rule.prefix).build())
        .status(status)
        .set_expiration(expiration)
        .build()
        .map_err(|e| Error::General(e.to_string()))
}

fn rule_from_sdk(rule: &aws_sdk_s3::types::LifecycleRule) -> LifecycleRule {
    let status = match rule.status() {
        ExpirationStatus::Enabled => RuleStatus::Enabled,
        _ => RuleStatus::Disabled,
    };

    let expiration = rule.expiration().and_then(|exp| {
        if let Some(days) = exp.days() {
            return u32::try_from(days).ok().map(Expiration::Days);
        }
        exp.date()
            .and_then(to_timestamp)
            .map(|ts| Expiration::Date(ts.to_zoned(TimeZone::UTC).date()))
    });

    LifecycleRule {
        id: rule.id().unwrap_or_default().to_string(),
        prefix: rule
            .filter()
            .and_then(|f| f.prefix())
            .unwrap_or_default()
            .to_string(),
        status,
        expiration,
    }
}
