//! oss-tool - Command-line client for object-storage buckets
//!
//! # Usage
//!
//! ```bash
//! # Save credentials and the default bucket
//! oss-tool conf --accessKeyId AKID --accessKeySecret SECRET \
//!     --endpoint oss-cn-hangzhou.aliyuncs.com --bucket photos
//!
//! # Upload a folder, keeping its relative layout under a prefix
//! oss-tool upload-files ./album --prefix backup/
//!
//! # Keep the newest 10 objects under logs/
//! oss-tool delete-floders logs --number 10
//! ```

mod commands;
mod exit_code;
mod output;

use anyhow::Context;
use clap::Parser;
use clap::error::ErrorKind;
use tracing_subscriber::EnvFilter;

use commands::Cli;
use exit_code::ExitCode;

/// Initialize tracing on stderr
///
/// `RUST_LOG` wins over `--debug`; without either only warnings are shown.
fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("oss_tool=debug,ot_core=debug,ot_s3=debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> anyhow::Result<std::process::ExitCode> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success,
                _ => ExitCode::UsageError,
            };
            return Ok(code.into());
        }
    };

    init_tracing(cli.global.debug);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let code = runtime.block_on(commands::execute(cli));
    tracing::debug!(code = code.as_i32(), "Command finished");
    Ok(code.into())
}
