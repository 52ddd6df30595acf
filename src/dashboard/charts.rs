//! Painter-drawn chart primitives: sparklines, histogram bars, category bars.

use eframe::egui::{self, Pos2, Rect, Sense, Shape, Stroke, Vec2};

use super::engine::format_money;

/// Axis-free line over (x, y) points, scaled to fit the allocated rect.
pub fn sparkline(ui: &mut egui::Ui, points: &[[f64; 2]], size: Vec2) {
    let (rect, _response) = ui.allocate_exact_size(size, Sense::hover());
    let painter = ui.painter().with_clip_rect(rect);
    painter.rect_filled(rect, 2.0, ui.visuals().extreme_bg_color);
    if points.len() < 2 {
        return;
    }

    let inner = rect.shrink(3.0);
    let (min_x, max_x) = bounds(points.iter().map(|p| p[0]));
    let (min_y, max_y) = bounds(points.iter().map(|p| p[1]));
    let span_x = (max_x - min_x).max(f64::EPSILON);
    let span_y = (max_y - min_y).max(f64::EPSILON);

    let line: Vec<Pos2> = points
        .iter()
        .map(|[x, y]| {
            let tx = ((x - min_x) / span_x) as f32;
            let ty = ((y - min_y) / span_y) as f32;
            Pos2::new(
                inner.left() + tx * inner.width(),
                inner.bottom() - ty * inner.height(),
            )
        })
        .collect();
    painter.add(Shape::line(
        line,
        Stroke::new(1.5, ui.visuals().selection.stroke.color),
    ));
}

/// Vertical bars for a series whose y values are already normalized to [0, 1].
pub fn bar_spark(ui: &mut egui::Ui, bars: &[[f64; 2]], size: Vec2) {
    let (rect, _response) = ui.allocate_exact_size(size, Sense::hover());
    let painter = ui.painter().with_clip_rect(rect);
    painter.rect_filled(rect, 2.0, ui.visuals().extreme_bg_color);
    if bars.is_empty() {
        return;
    }

    let inner = rect.shrink(3.0);
    let width = inner.width() / bars.len() as f32;
    let color = ui.visuals().selection.bg_fill;
    for (ix, [_, y]) in bars.iter().enumerate() {
        let height = (*y as f32).clamp(0.0, 1.0) * inner.height();
        if height <= 0.0 {
            continue;
        }
        let left = inner.left() + ix as f32 * width;
        let bar = Rect::from_min_max(
            Pos2::new(left + 0.5, inner.bottom() - height),
            Pos2::new(left + width - 0.5, inner.bottom()),
        );
        painter.rect_filled(bar, 1.0, color);
    }
}

/// Horizontal bars with a name label and the mean price at the end.
pub fn category_bars(ui: &mut egui::Ui, series: &[(String, f64)]) {
    let peak = series.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
    if series.is_empty() || peak <= 0.0 {
        return;
    }
    for (name, mean) in series {
        ui.horizontal(|ui| {
            ui.add_sized(
                [140.0, 16.0],
                egui::Label::new(name).truncate(),
            );
            let bar_width = (ui.available_width() - 80.0).max(40.0);
            let (rect, _response) =
                ui.allocate_exact_size(Vec2::new(bar_width, 12.0), Sense::hover());
            let frac = ((mean / peak) as f32).clamp(0.0, 1.0);
            let bar = Rect::from_min_size(rect.min, Vec2::new(rect.width() * frac, rect.height()));
            ui.painter()
                .rect_filled(bar, 2.0, ui.visuals().selection.bg_fill);
            ui.monospace(format_money(Some(*mean)));
        });
    }
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)))
}
