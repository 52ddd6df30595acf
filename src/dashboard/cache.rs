//! Explicit cache for the dashboard's base table.
//!
//! The table loads once and stays until `invalidate` is called; the Reload
//! control is the only invalidation path. Store preflight happens here so the
//! UI can show an instruction instead of a query error when the pipeline has
//! not run yet.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::db::{self, Product, PRODUCTS_TABLE};

pub struct TableCache {
    db_path: PathBuf,
    rows: Option<Vec<Product>>,
}

impl TableCache {
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            db_path,
            rows: None,
        }
    }

    /// The cached base table, loading it on first use.
    pub fn rows(&mut self) -> Result<&[Product]> {
        if self.rows.is_none() {
            self.rows = Some(self.load()?);
        }
        Ok(self.rows.as_deref().unwrap_or_default())
    }

    /// Drop the cached table; the next `rows` call reloads from the store.
    pub fn invalidate(&mut self) {
        self.rows = None;
    }

    fn load(&self) -> Result<Vec<Product>> {
        if !self.db_path.exists() {
            bail!(
                "No product database at {}. Run `storelens run` first.",
                self.db_path.display()
            );
        }
        let conn = db::connect(&self.db_path)?;
        if !db::table_exists(&conn, PRODUCTS_TABLE)? {
            bail!(
                "{} has no `{}` table. Run `storelens run` first.",
                self.db_path.display(),
                PRODUCTS_TABLE
            );
        }
        db::fetch_products(&conn)
    }
}
