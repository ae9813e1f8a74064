// SPDX-License-Identifier: MIT OR Apache-2.0

use etap_core::{TapDetails, TapListEntry};
use std::fmt;
use tabled::{Table, Tabled};

/// Output format of the `etap` commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Aligned table.
    #[default]
    Table,
    /// Pretty-printed JSON.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Table => "table",
            Self::Json => "json",
        })
    }
}

#[derive(Tabled)]
struct EntryRow<'a> {
    #[tabled(rename = "name")]
    name: &'a str,
    #[tabled(rename = "ID")]
    id: &'a str,
    #[tabled(rename = "web hook URL")]
    webhook_url: &'a str,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "field")]
    field: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

/// Render a tap listing.
///
/// # Errors
///
/// Only JSON serialization can fail.
pub fn render_entries(
    entries: &[TapListEntry],
    format: OutputFormat,
) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(entries),
        OutputFormat::Table => Ok(Table::new(entries.iter().map(|e| EntryRow {
            name: &e.name,
            id: &e.id,
            webhook_url: &e.webhook_url,
        }))
        .to_string()),
    }
}

/// Render the details of one tap.
///
/// # Errors
///
/// Only JSON serialization can fail.
pub fn render_details(
    details: &TapDetails,
    format: OutputFormat,
) -> Result<String, serde_json::Error> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(details);
    }

    let or_dash = |v: Option<&str>| v.filter(|s| !s.is_empty()).unwrap_or("-").to_string();
    let mut rows = vec![
        FieldRow { field: "ID", value: details.id.clone() },
        FieldRow { field: "name", value: details.name.clone() },
        FieldRow { field: "web hook URL", value: details.webhook_url.clone() },
        FieldRow { field: "batch limit", value: details.batch_limit.to_string() },
        FieldRow { field: "running", value: details.running.to_string() },
        FieldRow { field: "last id", value: or_dash(details.checkpoint.as_deref()) },
        FieldRow { field: "status", value: or_dash(details.status.as_deref()) },
    ];
    if let Some(stats) = &details.stats {
        rows.extend([
            FieldRow { field: "iterations", value: stats.iterations.to_string() },
            FieldRow { field: "deliveries", value: stats.deliveries.to_string() },
            FieldRow {
                field: "consecutive failures",
                value: stats.consecutive_failures.to_string(),
            },
            FieldRow { field: "total failures", value: stats.total_failures.to_string() },
        ]);
    }
    Ok(Table::new(rows).to_string())
}
