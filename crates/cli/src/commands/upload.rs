//! upload-files command - Upload local files and folders
//!
//! Every path is walked into upload tasks; tasks run through a bounded pool
//! and each one is reported individually.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use ot_core::{
    UploadEngine, UploadEvent, UploadObserver, UploadReceipt, UploadTask, run_bounded, walk,
};
use serde::Serialize;

use super::{CommandContext, FailedItem, exit_for};
use crate::exit_code::ExitCode;
use crate::output::format_size;

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Local files or folders
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Remote prefix (default: prefix from the config file)
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Debug, Serialize)]
struct UploadOutput {
    uploaded: Vec<UploadReceipt>,
    failed: Vec<FailedItem>,
}

/// Drives the progress bar from upload events
struct ProgressObserver {
    bar: ProgressBar,
}

impl UploadObserver for ProgressObserver {
    fn on_event(&self, event: &UploadEvent) {
        match event {
            UploadEvent::PartUploaded {
                key,
                part_number,
                total_parts,
                ..
            } => self
                .bar
                .set_message(format!("{key} (part {part_number}/{total_parts})")),
            UploadEvent::Completed { key, .. } => {
                self.bar.inc(1);
                self.bar.set_message(key.clone());
            }
        }
    }
}

/// Execute the upload-files command
pub async fn execute(args: UploadArgs, ctx: &CommandContext) -> ExitCode {
    let formatter = &ctx.formatter;

    let config = match ctx.config(|o| o.prefix = args.prefix.clone()) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let client = match ctx.connect(&config, true).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    let (tasks, mut failed) = collect_tasks(&args.files, config.default_prefix());
    for failure in &failed {
        formatter.error(&format!("Skipping {}: {}", failure.item, failure.error));
    }

    let progress = formatter.progress_enabled().then(|| {
        let bar = ProgressBar::new(tasks.len() as u64);
        let style = ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar
    });

    let mut engine = UploadEngine::new(client, config.transfer.clone());
    if let Some(bar) = &progress {
        engine = engine.with_observer(Arc::new(ProgressObserver { bar: bar.clone() }));
    }

    let engine = &engine;
    let report = run_bounded(tasks, config.transfer.parallel, |task: UploadTask| async move {
        engine.upload(&task).await
    })
    .await;

    if let Some(bar) = &progress {
        bar.finish_and_clear();
    }

    let mut uploaded = Vec::new();
    for outcome in report.outcomes {
        match outcome.result {
            Ok(receipt) => {
                formatter.success(&format!(
                    "{} -> {} ({})",
                    outcome.item.local_path.display(),
                    formatter.style_name(&receipt.key),
                    formatter.style_size(&format_size(receipt.size_bytes))
                ));
                uploaded.push(receipt);
            }
            Err(e) => {
                formatter.error(&format!(
                    "Failed to upload {}: {e}",
                    outcome.item.local_path.display()
                ));
                failed.push(FailedItem {
                    item: outcome.item.local_path.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    let exit = exit_for(&failed);

    if formatter.is_json() {
        formatter.json(&UploadOutput { uploaded, failed });
    } else if exit != ExitCode::Success {
        formatter.warning(&format!(
            "{} uploaded, {} failed",
            uploaded.len(),
            failed.len()
        ));
    }

    exit
}

/// Walk every input path, separating tasks from per-entry failures
fn collect_tasks(paths: &[PathBuf], prefix: &str) -> (Vec<UploadTask>, Vec<FailedItem>) {
    let mut tasks = Vec::new();
    let mut failed = Vec::new();

    for path in paths {
        for item in walk(path, prefix) {
            match item {
                Ok(task) => tasks.push(task),
                Err(e) => failed.push(FailedItem {
                    item: path.display().to_string(),
                    error: e.to_string(),
                }),
            }
        }
    }

    tracing::debug!(tasks = tasks.len(), skipped = failed.len(), "Collected upload tasks");
    (tasks, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::GlobalArgs;
    use tempfile::TempDir;

    #[test]
    fn test_collect_tasks_reports_missing_paths() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), b"a").unwrap();

        let paths = vec![temp.path().join("a.txt"), temp.path().join("missing.txt")];
        let (tasks, failed) = collect_tasks(&paths, "backup");

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].remote_key, "backup/a.txt");
        assert_eq!(failed.len(), 1);
        assert!(failed[0].item.ends_with("missing.txt"));
    }

    #[tokio::test]
    async fn test_upload_without_bucket_is_usage_error() {
        let temp = TempDir::new().unwrap();
        let conf = temp.path().join("env.conf");
        std::fs::write(
            &conf,
            "accessKeyId=AKID\naccessKeySecret=secret\nendpoint=localhost:9000\n",
        )
        .unwrap();

        let ctx = CommandContext::new(&GlobalArgs {
            conf: Some(conf),
            quiet: true,
            ..Default::default()
        });
        let args = UploadArgs {
            files: vec![temp.path().join("env.conf")],
            prefix: None,
        };

        assert_eq!(execute(args, &ctx).await, ExitCode::UsageError);
    }
}
