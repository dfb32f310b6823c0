//! Bucket commands - create, delete and list buckets

use clap::Args;
use ot_core::{BucketInfo, ObjectStore as _};
use serde::Serialize;

use super::CommandContext;
use crate::exit_code::ExitCode;
use crate::output::format_timestamp;

#[derive(Args, Debug)]
pub struct BucketNameArgs {
    /// Bucket name
    pub bucket: String,
}

#[derive(Debug, Serialize)]
struct BucketOutput {
    bucket: String,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct BucketListOutput {
    buckets: Vec<BucketInfo>,
}

pub async fn execute_create(args: BucketNameArgs, ctx: &CommandContext) -> ExitCode {
    let bucket = match validate_bucket_name(&args.bucket) {
        Ok(name) => name,
        Err(message) => {
            ctx.formatter.error(&message);
            return ExitCode::UsageError;
        }
    };

    let config = match ctx.config(|_| {}) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let client = match ctx.connect(&config, false).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    match client.create_bucket(bucket).await {
        Ok(()) => {
            print_status(ctx, bucket, "created");
            ExitCode::Success
        }
        Err(e) => ctx.fail(&format!("Failed to create bucket '{bucket}'"), &e),
    }
}

pub async fn execute_delete(args: BucketNameArgs, ctx: &CommandContext) -> ExitCode {
    let bucket = match validate_bucket_name(&args.bucket) {
        Ok(name) => name,
        Err(message) => {
            ctx.formatter.error(&message);
            return ExitCode::UsageError;
        }
    };

    let config = match ctx.config(|_| {}) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let client = match ctx.connect(&config, false).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    match client.delete_bucket(bucket).await {
        Ok(()) => {
            print_status(ctx, bucket, "deleted");
            ExitCode::Success
        }
        Err(e) => ctx.fail(&format!("Failed to delete bucket '{bucket}'"), &e),
    }
}

pub async fn execute_list(ctx: &CommandContext) -> ExitCode {
    let config = match ctx.config(|_| {}) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let client = match ctx.connect(&config, false).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    let buckets = match client.list_buckets().await {
        Ok(buckets) => buckets,
        Err(e) => return ctx.fail("Failed to list buckets", &e),
    };

    let formatter = &ctx.formatter;
    if formatter.is_json() {
        formatter.json(&BucketListOutput { buckets });
        return ExitCode::Success;
    }

    for bucket in &buckets {
        let created = bucket
            .created
            .map(format_timestamp)
            .unwrap_or_else(|| "-".to_string());
        formatter.println(&format!(
            "{}  {}",
            formatter.style_date(&format!("{created:<19}")),
            formatter.style_name(&bucket.name)
        ));
    }
    ExitCode::Success
}

fn print_status(ctx: &CommandContext, bucket: &str, status: &'static str) {
    if ctx.formatter.is_json() {
        ctx.formatter.json(&BucketOutput {
            bucket: bucket.to_string(),
            status,
        });
    } else {
        ctx.formatter.success(&format!("Bucket '{bucket}' {status}"));
    }
}

/// Reject names no S3-compatible store accepts
fn validate_bucket_name(name: &str) -> Result<&str, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Bucket name cannot be empty".to_string());
    }
    if name.contains('/') {
        return Err(format!("Bucket name '{name}' must not contain '/'"));
    }
    if !(3..=63).contains(&name.len()) {
        return Err(format!("Bucket name '{name}' must be 3 to 63 characters long"));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::GlobalArgs;

    #[test]
    fn test_validate_bucket_name() {
        assert_eq!(validate_bucket_name(" photos ").unwrap(), "photos");
        assert!(validate_bucket_name("").is_err());
        assert!(validate_bucket_name("a/b").is_err());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name(&"x".repeat(64)).is_err());
    }

    #[tokio::test]
    async fn test_create_invalid_name_returns_usage_error() {
        let ctx = CommandContext::new(&GlobalArgs::default());
        let args = BucketNameArgs {
            bucket: "a/b".to_string(),
        };
        assert_eq!(execute_create(args, &ctx).await, ExitCode::UsageError);
    }
}
