//! Flattening of nested JSON records into a flat table.
//!
//! Nested objects expand into dotted-path columns (`category.name`). Scalars
//! render as plain text, nulls as empty cells, and arrays as their JSON text
//! so list-valued fields survive the CSV round trip intact. Column order is
//! the order of first appearance across all records.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::table::Table;

pub fn flatten_records(records: &[Value]) -> Table {
    let mut columns: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut flat_rows: Vec<HashMap<String, String>> = Vec::with_capacity(records.len());

    for record in records {
        let mut cells: Vec<(String, String)> = Vec::new();
        flatten_value(record, String::new(), &mut cells);
        for (path, _) in &cells {
            if seen.insert(path.clone()) {
                columns.push(path.clone());
            }
        }
        flat_rows.push(cells.into_iter().collect());
    }

    let rows = flat_rows
        .into_iter()
        .map(|mut cells| {
            columns
                .iter()
                .map(|col| cells.remove(col).unwrap_or_default())
                .collect()
        })
        .collect();

    Table { columns, rows }
}

fn flatten_value(value: &Value, prefix: String, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_value(child, path, out);
            }
        }
        _ => out.push((prefix, render_scalar(value))),
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
