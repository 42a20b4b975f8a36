//! Report rendering: plain text, commit table, or JSON.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use gitmediate_core::models::FileAttribution;
use gitmediate_core::AttributionReport;

use crate::style;

/// How the report is written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text { verbose: bool },
    Table { verbose: bool },
    Json,
}

pub fn render(report: &AttributionReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(report).context("failed to serialize report")
        }
        OutputFormat::Text { verbose } => Ok(render_text(report, verbose, false)),
        OutputFormat::Table { verbose } => Ok(render_text(report, verbose, true)),
    }
}

fn render_text(report: &AttributionReport, verbose: bool, table: bool) -> String {
    let mut out: Vec<String> = Vec::new();

    if !report.has_conflicts() {
        out.push(style::success("No conflicts found."));
        return out.join("\n");
    }

    out.push(style::header("Conflicts found in the following files:"));
    for path in &report.files {
        out.push(format!("  - {}", style::path(path)));
    }

    if verbose {
        for detail in &report.details {
            out.push(String::new());
            out.extend(render_detail(detail));
        }
    }

    out.push(String::new());
    if report.commits.is_empty() {
        out.push(style::warn(
            "Could not identify the specific commits causing these conflicts.",
        ));
        out.push(style::dim(
            "This could be due to complex merge history or very old commits.",
        ));
        return out.join("\n");
    }

    out.push(style::header("Commits causing these conflicts:"));
    if table {
        out.push(String::new());
        out.push(commit_table(report).to_string());
    } else {
        for info in report.commits_by_date() {
            out.push(String::new());
            out.push(style::subject(&info.subject));
            out.push(format!("Author: {}", info.author));
            out.push(format!("Date: {}", info.date));
            out.push(format!("SHA: {}", info.id));
        }
    }
    out.join("\n")
}

fn render_detail(detail: &FileAttribution) -> Vec<String> {
    let mut lines = Vec::new();
    match detail.method {
        Some(method) => lines.push(format!("{} ({})", detail.path, style::dim(&method.to_string()))),
        None => {
            lines.push(format!("{} ({})", detail.path, style::dim("no text content recovered")));
            return lines;
        }
    }
    for line in &detail.conflicting_lines {
        lines.push(format!("    | {line}"));
    }
    if !detail.commits.is_empty() {
        let ids: Vec<&str> = detail.commits.iter().map(|c| c.short()).collect();
        lines.push(format!("    blamed: {}", ids.join(", ")));
    }
    lines
}

fn commit_table(report: &AttributionReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["SHA", "Subject", "Author", "Date"]);
    for info in report.commits_by_date() {
        table.add_row(vec![
            Cell::new(info.id.short()),
            Cell::new(&info.subject),
            Cell::new(&info.author),
            Cell::new(&info.date),
        ]);
    }
    table
}
