//! conf command - Persist connection settings
//!
//! Reads the config file (a missing file starts empty), applies the
//! connection flags and writes it back.

use clap::Args;
use ot_core::ConfigFile;
use ot_core::config::resolve_config_path;
use serde::Serialize;

use super::CommandContext;
use crate::exit_code::ExitCode;

#[derive(Args, Debug)]
pub struct ConfArgs {
    /// Default remote prefix for object commands
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfOutput {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_key_id: Option<String>,
    access_key_secret_set: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
}

/// Execute the conf command
pub fn execute(args: ConfArgs, ctx: &CommandContext) -> ExitCode {
    let (path, _explicit) = resolve_config_path(&ctx.overrides);

    // The file is being (re)written, so a missing file is never an error here
    let mut file = match ConfigFile::load(&path, false) {
        Ok(file) => file,
        Err(e) => return ctx.fail(&format!("Failed to read {}", path.display()), &e),
    };

    file.apply(&ctx.overrides);
    if let Some(prefix) = args.prefix.filter(|p| !p.is_empty()) {
        file.prefix = Some(prefix);
    }

    if let Err(e) = file.save(&path) {
        return ctx.fail(&format!("Failed to write {}", path.display()), &e);
    }

    if ctx.formatter.is_json() {
        ctx.formatter.json(&ConfOutput {
            path: path.display().to_string(),
            access_key_id: file.access_key_id,
            access_key_secret_set: file.access_key_secret.is_some(),
            endpoint: file.endpoint,
            bucket: file.bucket,
            region: file.region,
            prefix: file.prefix,
        });
    } else {
        ctx.formatter
            .success(&format!("Configuration saved to {}", path.display()));
    }
    ExitCode::Success
}
