//! SQLite store: bulk load of the cleaned table and dashboard queries.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use tracing::info;

use crate::table::Table;

pub const DB_PATH: &str = "data/store.sqlite";
pub const PRODUCTS_TABLE: &str = "products";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// Infer a column's affinity from its non-empty cells: INTEGER if they all
/// parse as i64, REAL if they all parse as f64, TEXT otherwise.
fn infer_column_type(table: &Table, ix: usize) -> ColumnType {
    let mut cells = table
        .rows
        .iter()
        .filter_map(|row| row.get(ix))
        .filter(|cell| !cell.is_empty())
        .peekable();
    if cells.peek().is_none() {
        return ColumnType::Text;
    }
    let mut integer = true;
    let mut real = true;
    for cell in cells {
        if integer && cell.trim().parse::<i64>().is_err() {
            integer = false;
        }
        if real && cell.trim().parse::<f64>().is_err() {
            real = false;
        }
        if !integer && !real {
            return ColumnType::Text;
        }
    }
    if integer {
        ColumnType::Integer
    } else if real {
        ColumnType::Real
    } else {
        ColumnType::Text
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql_value(cell: &str, ty: ColumnType) -> SqlValue {
    if cell.is_empty() {
        return SqlValue::Null;
    }
    match ty {
        ColumnType::Integer => cell
            .trim()
            .parse::<i64>()
            .map(SqlValue::Integer)
            .unwrap_or_else(|_| SqlValue::Text(cell.to_owned())),
        ColumnType::Real => cell
            .trim()
            .parse::<f64>()
            .map(SqlValue::Real)
            .unwrap_or_else(|_| SqlValue::Text(cell.to_owned())),
        ColumnType::Text => SqlValue::Text(cell.to_owned()),
    }
}

/// Replace `table_name` wholesale with the given table: drop, recreate with
/// inferred column types, bulk insert. Empty cells become NULL.
pub fn replace_table(conn: &Connection, table_name: &str, table: &Table) -> Result<()> {
    if table.columns.is_empty() {
        bail!("nothing to load: input has no columns");
    }
    let types: Vec<ColumnType> = (0..table.columns.len())
        .map(|ix| infer_column_type(table, ix))
        .collect();

    let column_defs: Vec<String> = table
        .columns
        .iter()
        .zip(&types)
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql()))
        .collect();
    let ident = quote_ident(table_name);

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {ident}; CREATE TABLE {ident} ({});",
        column_defs.join(", ")
    ))?;
    {
        let column_list: Vec<String> = table.columns.iter().map(|c| quote_ident(c)).collect();
        let placeholders: Vec<String> =
            (1..=table.columns.len()).map(|i| format!("?{i}")).collect();
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {ident} ({}) VALUES ({})",
            column_list.join(", "),
            placeholders.join(", ")
        ))?;
        for row in &table.rows {
            let values: Vec<SqlValue> = row
                .iter()
                .zip(&types)
                .map(|(cell, ty)| to_sql_value(cell, *ty))
                .collect();
            stmt.execute(rusqlite::params_from_iter(values))?;
        }
    }
    tx.commit()?;
    info!("Loaded {} rows into table {}", table.row_count(), table_name);
    Ok(())
}

/// Load the cleaned CSV at `input` into the store, replacing prior contents.
pub fn load_file(conn: &Connection, input: &Path) -> Result<usize> {
    if !input.exists() {
        bail!(
            "{} not found. Run `storelens transform` first.",
            input.display()
        );
    }
    let table = Table::read_csv(input)?;
    replace_table(conn, PRODUCTS_TABLE, &table)?;
    Ok(table.row_count())
}

pub fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// One cleaned product row, as the dashboard sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct Product {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub price: f64,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub image_url: Option<String>,
}

/// Read the whole products table. Columns are resolved by name so optional
/// ones (`image_url`, category columns) may be absent; rows with a NULL price
/// never reach the dashboard.
pub fn fetch_products(conn: &Connection) -> Result<Vec<Product>> {
    let ident = quote_ident(PRODUCTS_TABLE);
    let mut stmt = conn.prepare(&format!("SELECT * FROM {ident} WHERE price IS NOT NULL"))?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let ix = |name: &str| names.iter().position(|n| n == name);

    let price_ix =
        ix("price").with_context(|| format!("table {PRODUCTS_TABLE} has no price column"))?;
    let id_ix = ix("id");
    let title_ix = ix("title");
    let description_ix = ix("description");
    let category_id_ix = ix("category_id");
    let category_name_ix = ix("category_name");
    let image_url_ix = ix("image_url");

    let rows = stmt
        .query_map([], |row| {
            Ok(Product {
                id: match id_ix {
                    Some(i) => row.get(i)?,
                    None => None,
                },
                title: match title_ix {
                    Some(i) => row.get(i)?,
                    None => None,
                },
                price: row.get(price_ix)?,
                description: match description_ix {
                    Some(i) => row.get(i)?,
                    None => None,
                },
                category_id: match category_id_ix {
                    Some(i) => row.get(i)?,
                    None => None,
                },
                category_name: match category_name_ix {
                    Some(i) => row.get(i)?,
                    None => None,
                },
                image_url: match image_url_ix {
                    Some(i) => row.get(i)?,
                    None => None,
                },
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct StoreStats {
    pub products: usize,
    pub categories: Option<usize>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
}

pub fn get_stats(conn: &Connection) -> Result<StoreStats> {
    let ident = quote_ident(PRODUCTS_TABLE);
    let products: usize =
        conn.query_row(&format!("SELECT COUNT(*) FROM {ident}"), [], |row| row.get(0))?;

    let stmt = conn.prepare(&format!("SELECT * FROM {ident} LIMIT 0"))?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    drop(stmt);

    let categories = if names.iter().any(|n| n == "category_name") {
        Some(conn.query_row(
            &format!("SELECT COUNT(DISTINCT category_name) FROM {ident}"),
            [],
            |row| row.get(0),
        )?)
    } else {
        None
    };

    let (price_min, price_max) = if names.iter().any(|n| n == "price") {
        conn.query_row(
            &format!("SELECT MIN(price), MAX(price) FROM {ident}"),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?
    } else {
        (None, None)
    };

    Ok(StoreStats {
        products,
        categories,
        price_min,
        price_max,
    })
}
