//! Text rendering for tool results.
//!
//! Tool output is read by a model, so results are rendered as compact ASCII
//! tables rather than JSON.

use crate::models::{ColumnDefinition, QueryResult};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

pub const NO_RESULTS: &str = "No results found";

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(arr) => serde_json::to_string(arr).unwrap_or_default(),
        JsonValue::Object(obj) => serde_json::to_string(obj).unwrap_or_default(),
    }
}

/// Render rows as an ASCII table with numbers right-aligned.
pub fn format_as_table(columns: &[String], rows: &[serde_json::Map<String, JsonValue>]) -> String {
    if columns.is_empty() {
        return NO_RESULTS.to_string();
    }

    let cells: Vec<Vec<(String, bool)>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|name| {
                    let value = row.get(name).unwrap_or(&JsonValue::Null);
                    (format_value(value), value.is_number())
                })
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in &cells {
        for (i, (text, _)) in row.iter().enumerate() {
            widths[i] = widths[i].max(text.width());
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = separator.clone();
    for (name, w) in columns.iter().zip(&widths) {
        output.push_str(&format!("| {} ", pad(name, *w, false)));
    }
    output.push_str("|\n");
    output.push_str(&separator);

    for row in &cells {
        for ((text, numeric), w) in row.iter().zip(&widths) {
            output.push_str(&format!("| {} ", pad(text, *w, *numeric)));
        }
        output.push_str("|\n");
    }
    output.push_str(&separator);
    output
}

// Pads by display width; `format!` width counts chars, not columns.
fn pad(text: &str, width: usize, right_align: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(text.width()));
    if right_align {
        format!("{fill}{text}")
    } else {
        format!("{text}{fill}")
    }
}

/// Render a query result, noting the full row count when it was truncated.
pub fn render_result(result: &QueryResult) -> String {
    if result.is_empty() {
        return NO_RESULTS.to_string();
    }

    let columns: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
    let mut output = format_as_table(&columns, &result.rows);
    if result.truncated {
        output.push_str(&format!("... ({} rows)", result.total_rows));
    } else {
        output.truncate(output.trim_end().len());
    }
    output
}

/// Render `PRAGMA table_info` style column metadata.
pub fn render_columns(columns: &[ColumnDefinition]) -> String {
    let headers: Vec<String> = ["name", "type", "nullable", "default", "primary_key"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let rows: Vec<serde_json::Map<String, JsonValue>> = columns
        .iter()
        .map(|c| {
            let mut row = serde_json::Map::new();
            row.insert("name".into(), JsonValue::String(c.name.clone()));
            row.insert("type".into(), JsonValue::String(c.data_type.clone()));
            row.insert("nullable".into(), JsonValue::Bool(c.nullable));
            row.insert(
                "default".into(),
                c.default_value
                    .clone()
                    .map(JsonValue::String)
                    .unwrap_or(JsonValue::Null),
            );
            row.insert("primary_key".into(), JsonValue::Bool(c.primary_key));
            row
        })
        .collect();

    let table = format_as_table(&headers, &rows);
    table.trim_end().to_string()
}
