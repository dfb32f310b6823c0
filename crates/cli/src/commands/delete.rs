//! delete-files / delete-floders commands
//!
//! Folder cleanup lists each folder exhaustively, lets the retention policy
//! pick what goes, then deletes in batches.

use clap::Args;
use ot_core::traits::{delete_all, list_all_objects};
use ot_core::{
    DeleteResult, ListOptions, ObjectStore, RemoteObject, RetentionPolicy, normalize_prefix,
    retention, run_bounded,
};
use serde::Serialize;

use super::download::remote_keys;
use super::{CommandContext, FailedItem, exit_for};
use crate::exit_code::ExitCode;

#[derive(Args, Debug)]
pub struct DeleteFilesArgs {
    /// Object keys to delete
    #[arg(required = true)]
    pub files: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DeleteFoldersArgs {
    /// Remote folders, relative to the prefix
    #[arg(required = true)]
    pub folders: Vec<String>,

    /// Remote prefix (default: prefix from the config file)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Keep the N most recently modified objects of each folder
    #[arg(long, value_name = "N", conflicts_with = "expire_date")]
    pub number: Option<usize>,

    /// Delete objects modified before this date (YYYY-MM-DD or RFC 3339)
    #[arg(long = "expireDate", value_name = "DATE")]
    pub expire_date: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeleteFilesOutput {
    deleted: Vec<String>,
    failed: Vec<FailedItem>,
}

#[derive(Debug, Serialize)]
struct FolderCleanup {
    folder: String,
    listed: usize,
    deleted: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DeleteFoldersOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    policy: Option<String>,
    folders: Vec<FolderCleanup>,
    failed: Vec<FailedItem>,
}

/// Execute the delete-files command
pub async fn execute_files(args: DeleteFilesArgs, ctx: &CommandContext) -> ExitCode {
    let formatter = &ctx.formatter;

    let config = match ctx.config(|_| {}) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let client = match ctx.connect(&config, true).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    let result = match delete_all(client.as_ref(), args.files).await {
        Ok(result) => result,
        Err(e) => return ctx.fail("Failed to delete objects", &e),
    };

    let (deleted, failed) = split_result(result);
    report_keys(ctx, &deleted, &failed);

    let exit = exit_for(&failed);
    if formatter.is_json() {
        formatter.json(&DeleteFilesOutput { deleted, failed });
    }
    exit
}

/// Execute the delete-floders command
pub async fn execute_folders(args: DeleteFoldersArgs, ctx: &CommandContext) -> ExitCode {
    let formatter = &ctx.formatter;

    let config = match ctx.config(|o| {
        o.prefix = args.prefix.clone();
        o.number = args.number;
        o.expire_date = args.expire_date.clone();
    }) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let policy = match config.retention_policy() {
        Ok(policy) => policy,
        Err(e) => return ctx.fail("Invalid retention policy", &e),
    };

    let client = match ctx.connect(&config, true).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    let folders: Vec<String> = remote_keys(config.default_prefix(), &args.folders)
        .iter()
        .map(|folder| normalize_prefix(folder))
        .collect();

    let store = client.as_ref();
    let report = run_bounded(folders, config.transfer.parallel, |folder: String| async move {
        clean_folder(store, &folder, policy).await
    })
    .await;

    let mut cleaned = Vec::new();
    let mut failed = Vec::new();
    for outcome in report.outcomes {
        match outcome.result {
            Ok((listed, result)) => {
                let (deleted, rejected) = split_result(result);
                report_keys(ctx, &deleted, &rejected);
                if !formatter.is_json() {
                    formatter.println(&format!(
                        "{}: {} of {listed} object(s) deleted",
                        outcome.item,
                        deleted.len()
                    ));
                }
                failed.extend(rejected);
                cleaned.push(FolderCleanup {
                    folder: outcome.item,
                    listed,
                    deleted,
                });
            }
            Err(e) => {
                formatter.error(&format!("Failed to clean {}: {e}", outcome.item));
                failed.push(FailedItem {
                    item: outcome.item,
                    error: e.to_string(),
                });
            }
        }
    }

    let exit = exit_for(&failed);
    if formatter.is_json() {
        formatter.json(&DeleteFoldersOutput {
            policy: policy.map(|p| p.to_string()),
            folders: cleaned,
            failed,
        });
    }
    exit
}

/// List a folder, select victims and delete them; returns the listed count and delete outcome
async fn clean_folder<S>(
    store: &S,
    folder: &str,
    policy: Option<RetentionPolicy>,
) -> ot_core::Result<(usize, DeleteResult)>
where
    S: ObjectStore + ?Sized,
{
    let options = ListOptions {
        prefix: (!folder.is_empty()).then(|| folder.to_string()),
        ..Default::default()
    };
    let objects = list_all_objects(store, options).await?;

    let victims = select_victims(&objects, policy);
    tracing::info!(
        folder,
        listed = objects.len(),
        selected = victims.len(),
        "Selected objects for deletion"
    );

    let deleted = delete_all(store, victims).await?;
    Ok((objects.len(), deleted))
}

/// Deleted keys and the rejected ones as failed items
fn split_result(result: DeleteResult) -> (Vec<String>, Vec<FailedItem>) {
    let failed = result
        .failed
        .into_iter()
        .map(|f| FailedItem {
            item: f.key,
            error: f.message,
        })
        .collect();
    (result.deleted, failed)
}

fn report_keys(ctx: &CommandContext, deleted: &[String], failed: &[FailedItem]) {
    let formatter = &ctx.formatter;
    if !formatter.is_json() {
        for key in deleted {
            formatter.success(&format!("Deleted {}", formatter.style_name(key)));
        }
    }
    for failure in failed {
        formatter.error(&format!("Failed to delete {}: {}", failure.item, failure.error));
    }
}

/// Keys to delete; everything listed when no policy is set
fn select_victims(objects: &[RemoteObject], policy: Option<RetentionPolicy>) -> Vec<String> {
    let selected = match policy {
        Some(policy) => retention::select(objects, policy),
        None => objects.to_vec(),
    };
    selected.into_iter().map(|o| o.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, GlobalArgs};
    use clap::Parser;
    use jiff::Timestamp;
    use ot_core::traits::MockObjectStore;
    use ot_core::{DeleteFailure, ListResult};
    use std::sync::{Arc, Mutex};

    fn at(name: &str, secs: i64) -> RemoteObject {
        RemoteObject::new(name, Timestamp::from_second(secs).unwrap())
    }

    #[test]
    fn test_select_victims_without_policy() {
        let objects = vec![at("b", 2), at("a", 1)];
        assert_eq!(select_victims(&objects, None), vec!["b", "a"]);
    }

    #[test]
    fn test_select_victims_keep_last() {
        let objects = vec![at("c", 3), at("a", 1), at("b", 2)];
        assert_eq!(
            select_victims(&objects, Some(RetentionPolicy::KeepLast(1))),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_number_and_expire_date_conflict() {
        let result = Cli::try_parse_from([
            "oss-tool",
            "delete-floders",
            "logs",
            "--number",
            "3",
            "--expireDate",
            "2021-01-01",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_conflicting_policy_from_config_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let conf = temp.path().join("env.conf");
        std::fs::write(&conf, "number=3\nexpireDate=2021-01-01\n").unwrap();

        let ctx = CommandContext::new(&GlobalArgs {
            conf: Some(conf),
            quiet: true,
            ..Default::default()
        });
        let args = DeleteFoldersArgs {
            folders: vec!["logs".to_string()],
            prefix: None,
            number: None,
            expire_date: None,
        };
        assert_eq!(execute_folders(args, &ctx).await, ExitCode::UsageError);
    }

    fn paged_store(delete_calls: Arc<Mutex<Vec<Vec<String>>>>) -> MockObjectStore {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .withf(|o| o.prefix.as_deref() == Some("logs/") && o.marker.is_none())
            .times(1)
            .returning(|_| {
                Ok(ListResult {
                    objects: vec![at("logs/a", 1), at("logs/b", 3)],
                    common_prefixes: vec![],
                    next_marker: Some("logs/b".to_string()),
                })
            });
        store
            .expect_list_objects()
            .withf(|o| o.marker.as_deref() == Some("logs/b"))
            .times(1)
            .returning(|_| {
                Ok(ListResult {
                    objects: vec![at("logs/c", 2)],
                    common_prefixes: vec![],
                    next_marker: None,
                })
            });
        store.expect_delete_objects().returning(move |keys| {
            delete_calls.lock().unwrap().push(keys.clone());
            let (failed, deleted): (Vec<String>, Vec<String>) =
                keys.into_iter().partition(|k| k.ends_with("locked"));
            Ok(DeleteResult {
                deleted,
                failed: failed
                    .into_iter()
                    .map(|key| DeleteFailure {
                        key,
                        message: "AccessDenied".to_string(),
                    })
                    .collect(),
            })
        });
        store
    }

    #[tokio::test]
    async fn test_clean_folder_keeps_newest_across_pages() {
        let delete_calls = Arc::new(Mutex::new(Vec::new()));
        let store = paged_store(delete_calls.clone());

        let (listed, result) = clean_folder(&store, "logs/", Some(RetentionPolicy::KeepLast(1)))
            .await
            .unwrap();

        assert_eq!(listed, 3);
        assert_eq!(result.deleted, vec!["logs/a", "logs/c"]);
        assert!(result.failed.is_empty());
        assert_eq!(
            *delete_calls.lock().unwrap(),
            vec![vec!["logs/a".to_string(), "logs/c".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_clean_folder_keeping_everything_sends_no_delete() {
        let delete_calls = Arc::new(Mutex::new(Vec::new()));
        let store = paged_store(delete_calls.clone());

        let (listed, result) = clean_folder(&store, "logs/", Some(RetentionPolicy::KeepLast(5)))
            .await
            .unwrap();

        assert_eq!(listed, 3);
        assert!(result.deleted.is_empty());
        assert!(delete_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rejected_keys_fail_the_command() {
        let result = DeleteResult {
            deleted: vec!["logs/a".to_string()],
            failed: vec![DeleteFailure {
                key: "logs/locked".to_string(),
                message: "AccessDenied".to_string(),
            }],
        };

        let (deleted, failed) = split_result(result);
        assert_eq!(deleted, vec!["logs/a"]);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].item, "logs/locked");
        assert_eq!(failed[0].error, "AccessDenied");
        assert_eq!(exit_for(&failed), ExitCode::GeneralError);

        let (_, failed) = split_result(DeleteResult {
            deleted: vec!["logs/a".to_string()],
            failed: vec![],
        });
        assert_eq!(exit_for(&failed), ExitCode::Success);
    }
}
