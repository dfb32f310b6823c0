//! list-files command - List one page of objects
//!
//! The next marker is printed when the page is truncated so the listing can
//! be continued with `--marker`.

use clap::Args;
use comfy_table::{CellAlignment, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use ot_core::{ListOptions, ListResult, ObjectStore as _, RemoteObject};
use serde::Serialize;

use super::CommandContext;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, format_size, format_timestamp};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only list keys under this prefix (default: prefix from the config file)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Start listing after this key
    #[arg(long)]
    pub marker: Option<String>,

    /// Group keys up to this delimiter, e.g. "/"
    #[arg(long)]
    pub delimiter: Option<String>,

    /// Maximum number of keys to return
    #[arg(long, value_name = "N")]
    pub max_keys: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListOutput {
    objects: Vec<RemoteObject>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    common_prefixes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_marker: Option<String>,
}

/// Execute the list-files command
pub async fn execute(args: ListArgs, ctx: &CommandContext) -> ExitCode {
    let config = match ctx.config(|o| {
        o.prefix = args.prefix.clone();
        o.marker = args.marker.clone();
        o.delimiter = args.delimiter.clone();
    }) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let client = match ctx.connect(&config, true).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    let options = ListOptions {
        prefix: config.prefix.clone(),
        marker: config.marker.clone(),
        delimiter: config.delimiter.clone(),
        max_keys: args.max_keys,
    };

    match client.list_objects(options).await {
        Ok(page) => {
            print_page(&ctx.formatter, page);
            ExitCode::Success
        }
        Err(e) => ctx.fail("Failed to list objects", &e),
    }
}

fn print_page(formatter: &Formatter, page: ListResult) {
    if formatter.is_json() {
        formatter.json(&ListOutput {
            objects: page.objects,
            common_prefixes: page.common_prefixes,
            next_marker: page.next_marker,
        });
        return;
    }

    formatter.println(&build_table(&page).to_string());

    if let Some(marker) = &page.next_marker {
        formatter.println(&format!("Next marker: {marker}"));
    }
}

fn build_table(page: &ListResult) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Key", "Size", "Last Modified"]);

    for prefix in &page.common_prefixes {
        table.add_row(vec![prefix.as_str(), "DIR", ""]);
    }

    for object in &page.objects {
        let size = object
            .size
            .map(|s| format_size(s.max(0) as u64))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            object.name.clone(),
            size,
            format_timestamp(object.last_modified),
        ]);
    }

    if let Some(column) = table.column_mut(1) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    table
}
