//! Dashboard shell: filter side panel, KPI row, charts and product table.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use eframe::egui::{self, RichText, Vec2};
use egui_extras::{Column, TableBuilder};

use crate::dashboard::cache::TableCache;
use crate::dashboard::charts;
use crate::dashboard::engine::{self, FilterState, RenderFrame};
use crate::db::Product;

pub fn run(db_path: PathBuf) -> Result<()> {
    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "Storelens — Product Insights",
        options,
        Box::new(move |_cc| Ok(Box::new(DashboardApp::new(db_path)))),
    )
    .map_err(|e| anyhow!("dashboard failed: {e}"))
}

pub struct DashboardApp {
    cache: TableCache,
    products: Vec<Product>,
    categories: Vec<String>,
    price_bounds: (f64, f64),
    filter: FilterState,
    frame: RenderFrame,
    dirty: bool,
    load_error: Option<String>,
}

impl DashboardApp {
    pub fn new(db_path: PathBuf) -> Self {
        let mut app = Self {
            cache: TableCache::new(db_path),
            products: Vec::new(),
            categories: Vec::new(),
            price_bounds: (0.0, 0.0),
            filter: FilterState::default(),
            frame: RenderFrame::default(),
            dirty: false,
            load_error: None,
        };
        app.reload();
        app
    }

    /// Invalidate the cache and rebuild all derived state from the store.
    fn reload(&mut self) {
        self.cache.invalidate();
        match self.cache.rows() {
            Ok(rows) => {
                self.products = rows.to_vec();
                let mut categories: Vec<String> = self
                    .products
                    .iter()
                    .filter_map(|p| p.category_name.clone())
                    .collect();
                categories.sort();
                categories.dedup();
                self.categories = categories;
                self.price_bounds = engine::price_bounds(&self.products);
                self.reset_filters();
                self.load_error = None;
            }
            Err(err) => {
                self.products.clear();
                self.categories.clear();
                self.frame = RenderFrame::default();
                self.load_error = Some(err.to_string());
            }
        }
        self.dirty = true;
    }

    /// Defaults: every category selected, full observed price range, no query.
    fn reset_filters(&mut self) {
        self.filter = FilterState::unfiltered(&self.products);
        self.filter.categories = self.categories.iter().cloned().collect();
        self.dirty = true;
    }

    fn filter_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Filters");
        ui.add_space(4.0);

        ui.label(RichText::new("Categories").strong());
        ui.horizontal(|ui| {
            if ui.button("All").clicked() {
                self.filter.categories = self.categories.iter().cloned().collect();
                self.dirty = true;
            }
            if ui.button("None").clicked() {
                self.filter.categories.clear();
                self.dirty = true;
            }
        });
        egui::ScrollArea::vertical()
            .id_salt("category_list")
            .max_height(220.0)
            .show(ui, |ui| {
                let mut changed = false;
                for name in &self.categories {
                    let selected = self.filter.categories.contains(name);
                    if ui.selectable_label(selected, name).clicked() {
                        if selected {
                            self.filter.categories.remove(name);
                        } else {
                            self.filter.categories.insert(name.clone());
                        }
                        changed = true;
                    }
                }
                if changed {
                    self.dirty = true;
                }
            });

        ui.separator();
        ui.label(RichText::new("Price").strong());
        let (lo, hi) = self.price_bounds;
        ui.horizontal(|ui| {
            ui.label("Min");
            if ui
                .add(
                    egui::DragValue::new(&mut self.filter.price_min)
                        .speed(1.0)
                        .range(lo..=self.filter.price_max),
                )
                .changed()
            {
                self.dirty = true;
            }
            ui.label("Max");
            if ui
                .add(
                    egui::DragValue::new(&mut self.filter.price_max)
                        .speed(1.0)
                        .range(self.filter.price_min..=hi),
                )
                .changed()
            {
                self.dirty = true;
            }
        });

        ui.separator();
        ui.label(RichText::new("Search").strong());
        if ui.text_edit_singleline(&mut self.filter.query).changed() {
            self.dirty = true;
        }

        ui.separator();
        ui.horizontal(|ui| {
            if ui.button("Reset filters").clicked() {
                self.reset_filters();
            }
            if ui.button("Reload data").clicked() {
                self.reload();
            }
        });
    }

    fn main_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Product Insights");

        if let Some(message) = &self.load_error {
            ui.add_space(8.0);
            ui.colored_label(ui.visuals().warn_fg_color, message);
            return;
        }

        ui.add_space(6.0);
        ui.horizontal(|ui| {
            kpi(ui, "Products", &self.frame.kpis.count.to_string());
            kpi(ui, "Mean price", &engine::format_money(self.frame.kpis.mean));
            kpi(
                ui,
                "Median price",
                &engine::format_money(self.frame.kpis.median),
            );
            kpi(ui, "Outliers", &engine::format_pct(self.frame.kpis.outlier_pct));
        });

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            ui.vertical(|ui| {
                ui.label("Prices, sorted");
                charts::sparkline(ui, &self.frame.price_spark, Vec2::new(280.0, 64.0));
            });
            ui.vertical(|ui| {
                ui.label("Price distribution");
                charts::bar_spark(ui, &self.frame.histogram, Vec2::new(280.0, 64.0));
            });
        });

        ui.add_space(8.0);
        ui.label("Mean price by category");
        charts::category_bars(ui, &self.frame.category_means);

        ui.separator();
        self.product_table(ui);
    }

    fn product_table(&self, ui: &mut egui::Ui) {
        TableBuilder::new(ui)
            .striped(true)
            .column(Column::exact(56.0))
            .column(Column::initial(240.0).clip(true).at_least(120.0))
            .column(Column::exact(80.0))
            .column(Column::initial(130.0).clip(true))
            .column(Column::remainder().clip(true))
            .header(22.0, |mut header| {
                for title in ["ID", "Title", "Price", "Category", "Image"] {
                    header.col(|ui| {
                        ui.label(RichText::new(title).strong());
                    });
                }
            })
            .body(|body| {
                body.rows(18.0, self.frame.rows.len(), |mut row| {
                    let product = &self.products[self.frame.rows[row.index()]];
                    row.col(|ui| {
                        ui.label(product.id.map(|v| v.to_string()).unwrap_or_default());
                    });
                    row.col(|ui| {
                        ui.label(product.title.as_deref().unwrap_or(""));
                    });
                    row.col(|ui| {
                        ui.monospace(format!("{:.2}", product.price));
                    });
                    row.col(|ui| {
                        ui.label(product.category_name.as_deref().unwrap_or(""));
                    });
                    row.col(|ui| {
                        ui.label(product.image_url.as_deref().unwrap_or(""));
                    });
                });
            });
    }
}

fn kpi(ui: &mut egui::Ui, label: &str, value: &str) {
    ui.group(|ui| {
        ui.vertical(|ui| {
            ui.label(RichText::new(label).small());
            ui.label(RichText::new(value).strong().size(18.0));
        });
    });
}

impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::SidePanel::left("filters")
            .resizable(false)
            .default_width(230.0)
            .show(ctx, |ui| self.filter_panel(ui));

        // Filter edits land above; recompute before the central panel paints.
        if self.dirty {
            self.frame = engine::render(&self.products, &self.filter);
            self.dirty = false;
        }

        egui::CentralPanel::default().show(ctx, |ui| self.main_panel(ui));
    }
}
