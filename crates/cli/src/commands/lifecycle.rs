//! Lifecycle commands - create, list and delete bucket expiration rules

use clap::Args;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use jiff::civil::Date;
use ot_core::lifecycle::generate_rule_id;
use ot_core::{Expiration, LifecycleEditor, LifecycleRule, ObjectStore as _, RuleStatus};
use serde::Serialize;

use super::CommandContext;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Rule id (generated when omitted)
    #[arg(long)]
    pub id: Option<String>,

    /// Key prefix the rule applies to (default: prefix from the config file)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Rule status
    #[arg(long, default_value = "Enabled")]
    pub status: RuleStatus,

    /// Expire objects this many days after creation
    #[arg(long, conflicts_with = "date", required_unless_present = "date")]
    pub days: Option<u32>,

    /// Expire objects on this date (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<Date>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Rule id; deletes the whole lifecycle configuration when omitted
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
struct RulesOutput {
    rules: Vec<LifecycleRule>,
}

/// Execute the create-lifecycle command
pub async fn execute_create(args: CreateArgs, ctx: &CommandContext) -> ExitCode {
    let expiration = match expiration_from(args.days, args.date) {
        Some(expiration) => expiration,
        None => {
            ctx.formatter.error("Either --days or --date is required");
            return ExitCode::UsageError;
        }
    };

    let config = match ctx.config(|o| o.prefix = args.prefix.clone()) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let client = match ctx.connect(&config, true).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    let mut rule = LifecycleRule::new(
        args.id.unwrap_or_else(generate_rule_id),
        config.default_prefix(),
        expiration,
    );
    rule.status = args.status;
    let id = rule.id.clone();

    let editor = LifecycleEditor::new(client.as_ref());
    match editor.add_rule(rule).await {
        Ok(rules) => {
            ctx.formatter.success(&format!("Lifecycle rule '{id}' created"));
            print_rules(&ctx.formatter, rules);
            ExitCode::Success
        }
        Err(e) => ctx.fail("Failed to create lifecycle rule", &e),
    }
}

/// Execute the list-lifecycle command
pub async fn execute_list(ctx: &CommandContext) -> ExitCode {
    let config = match ctx.config(|_| {}) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let client = match ctx.connect(&config, true).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    match LifecycleEditor::new(client.as_ref()).list_rules().await {
        Ok(rules) => {
            print_rules(&ctx.formatter, rules);
            ExitCode::Success
        }
        Err(e) => ctx.fail("Failed to list lifecycle rules", &e),
    }
}

/// Execute the delete-lifecycle command
pub async fn execute_delete(args: DeleteArgs, ctx: &CommandContext) -> ExitCode {
    let config = match ctx.config(|_| {}) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let client = match ctx.connect(&config, true).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    let Some(id) = args.id else {
        return match client.delete_bucket_lifecycle().await {
            Ok(()) => {
                ctx.formatter.success("Lifecycle configuration deleted");
                print_rules(&ctx.formatter, Vec::new());
                ExitCode::Success
            }
            Err(e) => ctx.fail("Failed to delete lifecycle configuration", &e),
        };
    };

    match LifecycleEditor::new(client.as_ref()).remove_rule(&id).await {
        Ok(rules) => {
            ctx.formatter.success(&format!("Lifecycle rule '{id}' deleted"));
            print_rules(&ctx.formatter, rules);
            ExitCode::Success
        }
        Err(e) => ctx.fail(&format!("Failed to delete lifecycle rule '{id}'"), &e),
    }
}

fn expiration_from(days: Option<u32>, date: Option<Date>) -> Option<Expiration> {
    match (days, date) {
        (Some(days), _) => Some(Expiration::Days(days)),
        (None, Some(date)) => Some(Expiration::Date(date)),
        (None, None) => None,
    }
}

fn print_rules(formatter: &Formatter, rules: Vec<LifecycleRule>) {
    if formatter.is_json() {
        formatter.json(&RulesOutput { rules });
        return;
    }

    if rules.is_empty() {
        formatter.println("No lifecycle rules");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "Prefix", "Status", "Expiration"]);

    for rule in &rules {
        table.add_row(vec![
            rule.id.clone(),
            rule.prefix.clone(),
            rule.status.to_string(),
            rule.expiration
                .map(|e| e.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }

    formatter.println(&table.to_string());
}
