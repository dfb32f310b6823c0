//! download-files / download-floders commands
//!
//! Objects are written below the working directory at their key path.

use std::path::PathBuf;

use clap::Args;
use ot_core::{DownloadEngine, join_key, normalize_prefix, run_bounded};
use serde::Serialize;

use super::{CommandContext, FailedItem, exit_for};
use crate::exit_code::ExitCode;

#[derive(Args, Debug)]
pub struct DownloadFilesArgs {
    /// Object keys, relative to the prefix
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Remote prefix (default: prefix from the config file)
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Args, Debug)]
pub struct DownloadFoldersArgs {
    /// Remote folders, relative to the prefix
    #[arg(required = true)]
    pub folders: Vec<String>,

    /// Remote prefix (default: prefix from the config file)
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Debug, Serialize)]
struct DownloadedFile {
    key: String,
    path: String,
}

#[derive(Debug, Serialize)]
struct DownloadFilesOutput {
    downloaded: Vec<DownloadedFile>,
    failed: Vec<FailedItem>,
}

#[derive(Debug, Serialize)]
struct DownloadedFolder {
    folder: String,
    objects: usize,
}

#[derive(Debug, Serialize)]
struct DownloadFoldersOutput {
    downloaded: Vec<DownloadedFolder>,
    failed: Vec<FailedItem>,
}

/// Execute the download-files command
pub async fn execute_files(args: DownloadFilesArgs, ctx: &CommandContext) -> ExitCode {
    let formatter = &ctx.formatter;

    let config = match ctx.config(|o| o.prefix = args.prefix.clone()) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let client = match ctx.connect(&config, true).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    let engine = DownloadEngine::new(client, PathBuf::from("."));
    let keys = remote_keys(config.default_prefix(), &args.files);

    let engine = &engine;
    let report = run_bounded(keys, config.transfer.parallel, |key: String| async move {
        engine.download_object(&key).await
    })
    .await;

    let mut downloaded = Vec::new();
    let mut failed = Vec::new();
    for outcome in report.outcomes {
        match outcome.result {
            Ok(path) => {
                formatter.success(&format!(
                    "{} -> {}",
                    formatter.style_name(&outcome.item),
                    path.display()
                ));
                downloaded.push(DownloadedFile {
                    key: outcome.item,
                    path: path.display().to_string(),
                });
            }
            Err(e) => {
                formatter.error(&format!("Failed to download {}: {e}", outcome.item));
                failed.push(FailedItem {
                    item: outcome.item,
                    error: e.to_string(),
                });
            }
        }
    }

    let exit = exit_for(&failed);
    if formatter.is_json() {
        formatter.json(&DownloadFilesOutput { downloaded, failed });
    }
    exit
}

/// Execute the download-floders command
pub async fn execute_folders(args: DownloadFoldersArgs, ctx: &CommandContext) -> ExitCode {
    let formatter = &ctx.formatter;

    let config = match ctx.config(|o| o.prefix = args.prefix.clone()) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let client = match ctx.connect(&config, true).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    let engine = DownloadEngine::new(client, PathBuf::from("."));
    let folders: Vec<String> = remote_keys(config.default_prefix(), &args.folders)
        .iter()
        .map(|folder| normalize_prefix(folder))
        .collect();

    let engine = &engine;
    let report = run_bounded(folders, config.transfer.parallel, |folder: String| async move {
        engine.download_prefix(&folder).await
    })
    .await;

    let mut downloaded = Vec::new();
    let mut failed = Vec::new();
    for outcome in report.outcomes {
        match outcome.result {
            Ok(objects) => {
                formatter.success(&format!(
                    "{}: {objects} object(s) downloaded",
                    formatter.style_name(&outcome.item)
                ));
                downloaded.push(DownloadedFolder {
                    folder: outcome.item,
                    objects,
                });
            }
            Err(e) => {
                formatter.error(&format!("Failed to download {}: {e}", outcome.item));
                failed.push(FailedItem {
                    item: outcome.item,
                    error: e.to_string(),
                });
            }
        }
    }

    let exit = exit_for(&failed);
    if formatter.is_json() {
        formatter.json(&DownloadFoldersOutput { downloaded, failed });
    }
    exit
}

/// Full keys for names given relative to `prefix`
pub(super) fn remote_keys(prefix: &str, names: &[String]) -> Vec<String> {
    names.iter().map(|name| join_key(prefix, name)).collect()
}
