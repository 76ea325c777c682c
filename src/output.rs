//! Terminal output for CLI subcommands.
//!
//! Renders result pages as box-drawn text tables and run listings as
//! aligned columns, or either as pretty JSON.

use serde::Serialize;

use crate::query::{ResultPage, RunSnapshot};

/// Minimum column width for readability.
const MIN_COLUMN_WIDTH: usize = 3;

/// Maximum column width before truncation.
const MAX_COLUMN_WIDTH: usize = 40;

/// Output format for client subcommands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {s}. Expected: text or json")),
        }
    }
}

/// Serializes any value as pretty JSON.
pub fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"Failed to serialize: {e}\"}}"))
}

/// Truncates to `max_width` characters, adding an ellipsis if needed.
fn truncate(s: &str, max_width: usize) -> String {
    let len = s.chars().count();
    if len <= max_width {
        s.to_string()
    } else if max_width <= 3 {
        s.chars().take(max_width).collect()
    } else {
        let kept: String = s.chars().take(max_width - 3).collect();
        format!("{kept}...")
    }
}

fn column_widths(columns: &[String], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = columns
        .iter()
        .map(|c| c.chars().count().max(MIN_COLUMN_WIDTH))
        .collect();

    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(value.chars().count());
            }
        }
    }

    widths.into_iter().map(|w| w.min(MAX_COLUMN_WIDTH)).collect()
}

fn border(widths: &[usize], left: char, mid: char, right: char) -> String {
    let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
    format!("{left}{}{right}", segments.join(&mid.to_string()))
}

fn table_row(cells: &[String], widths: &[usize]) -> String {
    let rendered: Vec<String> = widths
        .iter()
        .enumerate()
        .map(|(i, &width)| {
            let value = cells.get(i).map(String::as_str).unwrap_or("");
            format!(" {:width$} ", truncate(value, width), width = width)
        })
        .collect();
    format!("│{}│", rendered.join("│"))
}

/// Renders a result page as a text table with a status footer.
pub fn format_result_page(page: &ResultPage) -> String {
    let mut lines = Vec::new();

    if page.columns.is_empty() {
        lines.push(format!("Status: {}", page.status));
        if let Some(message) = &page.error_message {
            lines.push(format!("Error: {message}"));
        }
        return lines.join("\n");
    }

    let widths = column_widths(&page.columns, &page.rows);
    lines.push(border(&widths, '┌', '┬', '┐'));
    lines.push(table_row(&page.columns, &widths));
    lines.push(border(&widths, '├', '┼', '┤'));
    for row in &page.rows {
        lines.push(table_row(row, &widths));
    }
    lines.push(border(&widths, '└', '┴', '┘'));
    lines.push(format!(
        "{} row{} (page {}, size {}) | {}",
        page.total,
        if page.total == 1 { "" } else { "s" },
        page.page,
        page.size,
        page.status
    ));

    lines.join("\n")
}

/// Renders a runs listing, one line per run.
pub fn format_runs(runs: &[RunSnapshot]) -> String {
    if runs.is_empty() {
        return "No runs".to_string();
    }

    runs.iter()
        .map(|snapshot| {
            let run = &snapshot.run;
            let mut line = format!(
                "{}  {:<9}  {}  {}",
                run.executed_at.format("%Y-%m-%d %H:%M:%S"),
                run.status.as_str(),
                run.execution_id,
                truncate(&run.sql.replace('\n', " "), 60)
            );
            if let Some(message) = &run.error_message {
                line.push_str(&format!("\n    error: {message}"));
            }
            if let Some(refresh_error) = &snapshot.refresh_error {
                line.push_str(&format!("\n    refresh failed: {refresh_error}"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
