//! Table rendering with `tabled`.

use super::{Column, OutputConfig};
use serde::Serialize;
use serde_json::Value;
use tabled::{
    builder::Builder,
    settings::{object::Columns, style::Style, Alignment, Modify, Width},
    Table,
};

pub struct TableOutput;

impl TableOutput {
    /// One row per item, cells read from the item's JSON by column key.
    pub fn format_with_columns<T: Serialize>(
        data: &[T],
        columns: &[Column],
        config: &OutputConfig,
    ) -> String {
        if data.is_empty() {
            return "(no results)".to_string();
        }

        let mut builder = Builder::default();
        builder.push_record(columns.iter().map(|c| c.header.as_str()));
        for item in data {
            let json = serde_json::to_value(item).unwrap_or_default();
            builder.push_record(columns.iter().map(|col| {
                let cell = cell_text(json.get(&col.key).unwrap_or(&Value::Null));
                match (col.max_width, config.wrap) {
                    (Some(max), Some(_)) => truncate(&cell, max),
                    _ => cell,
                }
            }));
        }

        let mut table = builder.build();
        for (i, col) in columns.iter().enumerate() {
            if col.right {
                table.with(Modify::new(Columns::single(i)).with(Alignment::right()));
            }
        }
        finish(table, config)
    }

    /// Two-column table of labelled values.
    pub fn format_key_value(pairs: &[(&str, String)], config: &OutputConfig) -> String {
        let mut builder = Builder::default();
        for (key, value) in pairs {
            builder.push_record([*key, value.as_str()]);
        }
        let mut table = builder.build();
        table.with(Modify::new(Columns::first()).with(Alignment::right()));
        finish(table, config)
    }
}

fn finish(mut table: Table, config: &OutputConfig) -> String {
    table.with(Style::rounded());
    if let Some(width) = config.wrap {
        table.with(Width::wrap(width));
    }
    table.to_string()
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => format!("[{} items]", items.len()),
        other => other.to_string(),
    }
}

fn truncate(s: &str, max_width: usize) -> String {
    if s.chars().count() <= max_width {
        s.to_string()
    } else if max_width <= 3 {
        s.chars().take(max_width).collect()
    } else {
        let kept: String = s.chars().take(max_width - 3).collect();
        format!("{}...", kept)
    }
}
