//! copy-file command - Server-side copy inside the configured bucket

use clap::Args;
use ot_core::{ObjectStore as _, PutReceipt};
use serde::Serialize;

use super::CommandContext;
use crate::exit_code::ExitCode;

#[derive(Args, Debug)]
pub struct CopyArgs {
    /// Destination key
    pub dest: String,

    /// Source key
    pub src: String,
}

#[derive(Debug, Serialize)]
struct CopyOutput {
    source: String,
    #[serde(flatten)]
    receipt: PutReceipt,
}

/// Execute the copy-file command
pub async fn execute(args: CopyArgs, ctx: &CommandContext) -> ExitCode {
    if args.src == args.dest {
        ctx.formatter
            .error("Source and destination must be different keys");
        return ExitCode::UsageError;
    }

    let config = match ctx.config(|_| {}) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let client = match ctx.connect(&config, true).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    let receipt = match client.copy_object(&args.src, &args.dest).await {
        Ok(receipt) => receipt,
        Err(e) => return ctx.fail(&format!("Failed to copy '{}'", args.src), &e),
    };

    if ctx.formatter.is_json() {
        ctx.formatter.json(&CopyOutput {
            source: args.src,
            receipt,
        });
    } else {
        ctx.formatter.success(&format!(
            "{} -> {}",
            args.src,
            ctx.formatter.style_name(&receipt.key)
        ));
    }
    ExitCode::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands, GlobalArgs};
    use clap::Parser;

    #[test]
    fn test_argument_order_is_dest_then_src() {
        let cli = Cli::try_parse_from(["oss-tool", "copy-file", "new.txt", "old.txt"]).unwrap();
        match cli.command {
            Commands::CopyFile(args) => {
                assert_eq!(args.dest, "new.txt");
                assert_eq!(args.src, "old.txt");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_same_key_is_usage_error() {
        let ctx = CommandContext::new(&GlobalArgs::default());
        let args = CopyArgs {
            dest: "a.txt".to_string(),
            src: "a.txt".to_string(),
        };
        assert_eq!(execute(args, &ctx).await, ExitCode::UsageError);
    }
}
