//! Interactive dashboard: an egui shell over a pure render engine.

pub mod app;
pub mod cache;
pub mod charts;
pub mod engine;
