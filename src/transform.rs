//! Cleaning of the raw flat table into the fixed product schema.

use std::path::Path;

use anyhow::{bail, Result};
use serde_json::Value;
use tracing::info;

use crate::table::Table;

pub const CLEAN_CSV: &str = "data/products_clean.csv";

/// Source column → cleaned column. Only these survive; absent source columns
/// are skipped.
const FIELD_MAP: &[(&str, &str)] = &[
    ("id", "id"),
    ("title", "title"),
    ("price", "price"),
    ("description", "description"),
    ("category.id", "category_id"),
    ("category.name", "category_name"),
    ("images", "images"),
];

/// Map the raw table to the cleaned schema: whitelist/rename columns, derive
/// `image_url` from the `images` list, and drop every row without a finite
/// numeric price.
pub fn transform_table(raw: &Table) -> Table {
    let picks: Vec<(usize, &str)> = FIELD_MAP
        .iter()
        .filter_map(|(src, dst)| raw.column_index(src).map(|ix| (ix, *dst)))
        .collect();

    let mut columns: Vec<String> = picks.iter().map(|(_, dst)| dst.to_string()).collect();
    let mut rows: Vec<Vec<String>> = raw
        .rows
        .iter()
        .map(|row| {
            picks
                .iter()
                .map(|(ix, _)| row.get(*ix).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    // images -> image_url (first element of the list, appended last); the
    // source column goes away whether or not the derivation produced a value.
    if let Some(images_ix) = columns.iter().position(|c| c == "images") {
        for row in &mut rows {
            let first = first_image(&row[images_ix]);
            row.remove(images_ix);
            row.push(first);
        }
        columns.remove(images_ix);
        columns.push("image_url".to_string());
    }

    match columns.iter().position(|c| c == "price") {
        Some(price_ix) => rows.retain(|row| parse_price(&row[price_ix]).is_some()),
        // No price column: no row can satisfy the non-null price invariant.
        None => rows.clear(),
    }

    Table { columns, rows }
}

/// Transform `input` into `output`. Returns (kept, dropped) row counts.
pub fn transform_file(input: &Path, output: &Path) -> Result<(usize, usize)> {
    if !input.exists() {
        bail!(
            "{} not found. Run `storelens extract` first.",
            input.display()
        );
    }
    let raw = Table::read_csv(input)?;
    let clean = transform_table(&raw);
    let kept = clean.row_count();
    let dropped = raw.row_count() - kept;
    clean.write_csv(output)?;
    info!(
        "Transformed {} rows into {} ({} dropped for unusable price)",
        raw.row_count(),
        output.display(),
        dropped
    );
    Ok((kept, dropped))
}

pub fn parse_price(cell: &str) -> Option<f64> {
    let value: f64 = cell.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

fn first_image(cell: &str) -> String {
    match serde_json::from_str::<Value>(cell) {
        Ok(Value::Array(items)) => items
            .first()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default(),
        _ => String::new(),
    }
}
