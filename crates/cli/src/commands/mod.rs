//! Command definitions and dispatch

mod bucket;
mod completions;
mod conf;
mod copy;
mod delete;
mod download;
mod lifecycle;
mod list;
mod upload;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use ot_core::{ConfigOverrides, EffectiveConfig, Error};
use ot_s3::S3Client;
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Command-line client for object-storage buckets and objects
#[derive(Parser, Debug)]
#[command(name = "oss-tool", version, about, propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags accepted by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Print JSON output
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Number of files/folders processed concurrently
    #[arg(long, global = true, value_name = "N")]
    pub parallel: Option<usize>,

    /// Access key id
    #[arg(long = "accessKeyId", global = true, env = "OSS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key_id: Option<String>,

    /// Access key secret
    #[arg(
        long = "accessKeySecret",
        global = true,
        env = "OSS_ACCESS_KEY_SECRET",
        hide_env_values = true
    )]
    pub access_key_secret: Option<String>,

    /// Service endpoint, e.g. oss-cn-hangzhou.aliyuncs.com
    #[arg(long, global = true, env = "OSS_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Bucket used by object commands
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Signing region
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Config file (default: <config dir>/oss-tool/env.conf)
    #[arg(long, global = true, value_name = "FILE")]
    pub conf: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn output_config(&self) -> OutputConfig {
        OutputConfig {
            json: self.json,
            no_color: self.no_color,
            quiet: self.quiet,
        }
    }

    /// Connection and transfer overrides; command-specific fields are left unset
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            access_key_id: self.access_key_id.clone(),
            access_key_secret: self.access_key_secret.clone(),
            endpoint: self.endpoint.clone(),
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            parallel: self.parallel,
            conf: self.conf.clone(),
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a bucket
    CreateBucket(bucket::BucketNameArgs),

    /// Delete an empty bucket
    DeleteBucket(bucket::BucketNameArgs),

    /// List buckets
    ListBucket,

    /// Upload local files and folders
    UploadFiles(upload::UploadArgs),

    /// Download objects into the working directory
    DownloadFiles(download::DownloadFilesArgs),

    /// Download every object under remote folders
    #[command(alias = "download-folders")]
    DownloadFloders(download::DownloadFoldersArgs),

    /// Delete objects
    DeleteFiles(delete::DeleteFilesArgs),

    /// Delete objects under remote folders, optionally keeping the newest
    #[command(alias = "delete-folders")]
    DeleteFloders(delete::DeleteFoldersArgs),

    /// Copy an object inside the bucket
    CopyFile(copy::CopyArgs),

    /// Add a lifecycle expiration rule to the bucket
    CreateLifecycle(lifecycle::CreateArgs),

    /// List the bucket lifecycle rules
    ListLifecycle,

    /// Delete one lifecycle rule, or all of them
    DeleteLifecycle(lifecycle::DeleteArgs),

    /// List one page of objects
    ListFiles(list::ListArgs),

    /// Write connection settings to the config file
    Conf(conf::ConfArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Execute the parsed command line
pub async fn execute(cli: Cli) -> ExitCode {
    let ctx = CommandContext::new(&cli.global);

    match cli.command {
        Commands::CreateBucket(args) => bucket::execute_create(args, &ctx).await,
        Commands::DeleteBucket(args) => bucket::execute_delete(args, &ctx).await,
        Commands::ListBucket => bucket::execute_list(&ctx).await,
        Commands::UploadFiles(args) => upload::execute(args, &ctx).await,
        Commands::DownloadFiles(args) => download::execute_files(args, &ctx).await,
        Commands::DownloadFloders(args) => download::execute_folders(args, &ctx).await,
        Commands::DeleteFiles(args) => delete::execute_files(args, &ctx).await,
        Commands::DeleteFloders(args) => delete::execute_folders(args, &ctx).await,
        Commands::CopyFile(args) => copy::execute(args, &ctx).await,
        Commands::CreateLifecycle(args) => lifecycle::execute_create(args, &ctx).await,
        Commands::ListLifecycle => lifecycle::execute_list(&ctx).await,
        Commands::DeleteLifecycle(args) => lifecycle::execute_delete(args, &ctx).await,
        Commands::ListFiles(args) => list::execute(args, &ctx).await,
        Commands::Conf(args) => conf::execute(args, &ctx),
        Commands::Completions(args) => completions::execute(args),
    }
}

/// A work item that failed, as reported in JSON output
#[derive(Debug, Serialize)]
pub struct FailedItem {
    pub item: String,
    pub error: String,
}

/// Exit code of a batch command: failure if any item failed
pub fn exit_for(failed: &[FailedItem]) -> ExitCode {
    if failed.is_empty() {
        ExitCode::Success
    } else {
        ExitCode::GeneralError
    }
}

/// State shared by every command of one invocation
pub struct CommandContext {
    pub formatter: Formatter,
    pub overrides: ConfigOverrides,
}

impl CommandContext {
    pub fn new(global: &GlobalArgs) -> Self {
        Self {
            formatter: Formatter::new(global.output_config()),
            overrides: global.overrides(),
        }
    }

    /// Resolve the effective configuration with extra command-specific overrides
    pub fn config(
        &self,
        customize: impl FnOnce(&mut ConfigOverrides),
    ) -> Result<EffectiveConfig, ExitCode> {
        let mut overrides = self.overrides.clone();
        customize(&mut overrides);

        EffectiveConfig::resolve(&overrides)
            .map_err(|e| self.fail("Failed to load configuration", &e))
    }

    /// Build the store client; object commands need a bucket
    pub async fn connect(
        &self,
        config: &EffectiveConfig,
        need_bucket: bool,
    ) -> Result<Arc<S3Client>, ExitCode> {
        let connection = config
            .connection()
            .map_err(|e| self.fail("Cannot connect", &e))?;

        if need_bucket && connection.bucket.is_none() {
            return Err(self.fail(
                "Cannot connect",
                &Error::MissingArgument("bucket".to_string()),
            ));
        }

        match S3Client::new(&connection).await {
            Ok(client) => Ok(Arc::new(client)),
            Err(e) => Err(self.fail("Failed to create client", &e)),
        }
    }

    /// Report an error and map it to an exit code
    pub fn fail(&self, action: &str, error: &Error) -> ExitCode {
        tracing::debug!(error = ?error, "{action}");
        self.formatter.error(&format!("{action}: {error}"));
        ExitCode::from_error(error)
    }
}
