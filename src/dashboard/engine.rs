//! Filter, KPI and chart-series computation for the dashboard.
//!
//! `render` is a pure function from the cached base table plus the current
//! filter state to everything the UI draws. The UI never computes; it only
//! mutates `FilterState` and repaints from the returned frame.

use std::collections::{BTreeMap, BTreeSet};

use crate::db::Product;

/// Target point count for the sorted-price sparkline.
pub const SPARK_POINTS: usize = 40;
/// Bin count for the normalized price histogram.
pub const HISTOGRAM_BINS: usize = 20;

pub const KPI_PLACEHOLDER: &str = "—";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterState {
    /// Selected category names. Empty set means no category filter.
    pub categories: BTreeSet<String>,
    /// Inclusive price bounds.
    pub price_min: f64,
    pub price_max: f64,
    /// Raw search text; trimmed before matching, empty means no filter.
    pub query: String,
}

impl FilterState {
    /// No-op filter spanning the observed price range of `base`.
    pub fn unfiltered(base: &[Product]) -> Self {
        let (price_min, price_max) = price_bounds(base);
        Self {
            categories: BTreeSet::new(),
            price_min,
            price_max,
            query: String::new(),
        }
    }
}

/// Observed min/max price, or (0, 0) for an empty table.
pub fn price_bounds(base: &[Product]) -> (f64, f64) {
    if base.is_empty() {
        return (0.0, 0.0);
    }
    base.iter().fold((f64::MAX, f64::MIN), |(lo, hi), p| {
        (lo.min(p.price), hi.max(p.price))
    })
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Kpis {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub outlier_pct: Option<f64>,
}

/// Everything a single dashboard repaint needs.
#[derive(Clone, Debug, Default)]
pub struct RenderFrame {
    /// Indices into the base table, in base order.
    pub rows: Vec<usize>,
    pub kpis: Kpis,
    /// Sorted-price sparkline: x = sample index, y = price.
    pub price_spark: Vec<[f64; 2]>,
    /// Normalized histogram: x = bin center, y = count / max count.
    pub histogram: Vec<[f64; 2]>,
    /// Mean price per category, alphabetical.
    pub category_means: Vec<(String, f64)>,
}

pub fn matches(product: &Product, filter: &FilterState) -> bool {
    if !filter.categories.is_empty() {
        match &product.category_name {
            Some(name) if filter.categories.contains(name) => {}
            _ => return false,
        }
    }
    if product.price < filter.price_min || product.price > filter.price_max {
        return false;
    }
    let query = filter.query.trim();
    if !query.is_empty() {
        let Some(title) = &product.title else {
            return false;
        };
        if !title.to_lowercase().contains(&query.to_lowercase()) {
            return false;
        }
    }
    true
}

pub fn render(base: &[Product], filter: &FilterState) -> RenderFrame {
    let rows: Vec<usize> = base
        .iter()
        .enumerate()
        .filter(|(_, p)| matches(p, filter))
        .map(|(ix, _)| ix)
        .collect();

    let mut prices: Vec<f64> = rows.iter().map(|&ix| base[ix].price).collect();
    prices.sort_by(f64::total_cmp);

    let kpis = compute_kpis(&prices);
    let price_spark = downsample_sorted(&prices, SPARK_POINTS);
    let histogram = histogram(&prices, HISTOGRAM_BINS);
    let category_means = category_means(base, &rows);

    RenderFrame {
        rows,
        kpis,
        price_spark,
        histogram,
        category_means,
    }
}

fn compute_kpis(sorted_prices: &[f64]) -> Kpis {
    let count = sorted_prices.len();
    if count == 0 {
        return Kpis::default();
    }
    let mean = sorted_prices.iter().sum::<f64>() / count as f64;
    let median = median(sorted_prices);
    let outliers = count_outliers(sorted_prices);
    Kpis {
        count,
        mean: Some(mean),
        median: Some(median),
        outlier_pct: Some(100.0 * outliers as f64 / count as f64),
    }
}

/// Median: mean of the two middle elements for even counts.
fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Quantile by nearest index: `idx = round(q * (n - 1))`, ties rounding up.
fn quantile_nearest(sorted: &[f64], q: f64) -> f64 {
    let h = q * (sorted.len() - 1) as f64;
    let ix = ((h + 0.5).floor() as usize).min(sorted.len() - 1);
    sorted[ix]
}

/// Tukey rule: outliers lie strictly outside [Q1 - 1.5*IQR, Q3 + 1.5*IQR].
fn count_outliers(sorted: &[f64]) -> usize {
    let q1 = quantile_nearest(sorted, 0.25);
    let q3 = quantile_nearest(sorted, 0.75);
    let iqr = q3 - q1;
    let lo = q1 - 1.5 * iqr;
    let hi = q3 + 1.5 * iqr;
    sorted.iter().filter(|&&p| p < lo || p > hi).count()
}

/// Down-sample a sorted series to at most `target` points by picking
/// evenly-spaced indices, truncating fractional positions.
fn downsample_sorted(sorted: &[f64], target: usize) -> Vec<[f64; 2]> {
    if sorted.len() <= target {
        return sorted
            .iter()
            .enumerate()
            .map(|(ix, &p)| [ix as f64, p])
            .collect();
    }
    let span = (sorted.len() - 1) as f64;
    (0..target)
        .map(|i| {
            let pos = i as f64 * span / (target - 1) as f64;
            [i as f64, sorted[pos as usize]]
        })
        .collect()
}

/// Equal-width bins over [min, max]; y is the bin count normalized by the
/// fullest bin. A degenerate range collapses to one full bin.
fn histogram(prices: &[f64], bins: usize) -> Vec<[f64; 2]> {
    let Some((&first, &last)) = prices.first().zip(prices.last()) else {
        return Vec::new();
    };
    let width = (last - first) / bins as f64;
    if width <= 0.0 {
        return vec![[first, 1.0]];
    }
    let mut counts = vec![0usize; bins];
    for &price in prices {
        let ix = (((price - first) / width) as usize).min(bins - 1);
        counts[ix] += 1;
    }
    let peak = counts.iter().copied().max().unwrap_or(0) as f64;
    counts
        .iter()
        .enumerate()
        .map(|(ix, &count)| {
            let center = first + width * (ix as f64 + 0.5);
            let y = if peak > 0.0 { count as f64 / peak } else { 0.0 };
            [center, y]
        })
        .collect()
}

/// Mean price per category over the filtered rows; null categories excluded.
fn category_means(base: &[Product], rows: &[usize]) -> Vec<(String, f64)> {
    let mut acc: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for &ix in rows {
        let product = &base[ix];
        if let Some(name) = &product.category_name {
            let entry = acc.entry(name.as_str()).or_insert((0.0, 0));
            entry.0 += product.price;
            entry.1 += 1;
        }
    }
    acc.into_iter()
        .map(|(name, (sum, count))| (name.to_owned(), sum / count as f64))
        .collect()
}

pub fn format_money(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("${v:.2}"),
        None => KPI_PLACEHOLDER.to_string(),
    }
}

pub fn format_pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1}%"),
        None => KPI_PLACEHOLDER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: i64, title: &str, price: f64, category: Option<&str>) -> Product {
        Product {
            id: Some(id),
            title: Some(title.to_string()),
            price,
            description: None,
            category_id: None,
            category_name: category.map(str::to_owned),
            image_url: None,
        }
    }

    fn base() -> Vec<Product> {
        vec![
            product(1, "Red Mug", 10.0, Some("Kitchen")),
            product(2, "Blue Mug", 12.0, Some("Kitchen")),
            product(3, "Desk Lamp", 40.0, Some("Lighting")),
            product(4, "Floor Lamp", 80.0, Some("Lighting")),
            Product {
                id: Some(5),
                title: None,
                price: 15.0,
                description: None,
                category_id: None,
                category_name: None,
                image_url: None,
            },
        ]
    }

    #[test]
    fn empty_category_selection_keeps_all_rows() {
        let base = base();
        let filter = FilterState::unfiltered(&base);
        let frame = render(&base, &filter);
        assert_eq!(frame.rows, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn nonempty_selection_keeps_members_and_drops_null_categories() {
        let base = base();
        let mut filter = FilterState::unfiltered(&base);
        filter.categories.insert("Kitchen".to_string());
        let frame = render(&base, &filter);
        assert_eq!(frame.rows, vec![0, 1]);
    }

    #[test]
    fn price_bounds_are_inclusive() {
        let base = base();
        let mut filter = FilterState::unfiltered(&base);
        filter.price_min = 12.0;
        filter.price_max = 40.0;
        let frame = render(&base, &filter);
        assert_eq!(frame.rows, vec![1, 2, 4]);
    }

    #[test]
    fn search_is_trimmed_case_insensitive_and_skips_null_titles() {
        let base = base();
        let mut filter = FilterState::unfiltered(&base);
        filter.query = "  lamp ".to_string();
        let frame = render(&base, &filter);
        assert_eq!(frame.rows, vec![2, 3]);

        filter.query = "   ".to_string();
        let frame = render(&base, &filter);
        assert_eq!(frame.rows.len(), 5);
    }

    #[test]
    fn filters_combine_with_and() {
        let base = base();
        let mut filter = FilterState::unfiltered(&base);
        filter.categories.insert("Lighting".to_string());
        filter.query = "floor".to_string();
        filter.price_max = 100.0;
        let frame = render(&base, &filter);
        assert_eq!(frame.rows, vec![3]);
    }

    #[test]
    fn iqr_outlier_reference_vector() {
        let base: Vec<Product> = [10.0, 12.0, 12.0, 13.0, 12.0, 100.0]
            .iter()
            .enumerate()
            .map(|(ix, &price)| product(ix as i64, "p", price, None))
            .collect();
        let filter = FilterState::unfiltered(&base);
        let frame = render(&base, &filter);
        let pct = frame.kpis.outlier_pct.unwrap();
        // Q1=12, Q3=13 under nearest-index quantiles; only 100 is flagged.
        assert!((pct - 100.0 / 6.0).abs() < 1e-9);
        assert_eq!(format_pct(frame.kpis.outlier_pct), "16.7%");
    }

    #[test]
    fn kpis_on_empty_filtered_set_are_placeholders() {
        let base = base();
        let mut filter = FilterState::unfiltered(&base);
        filter.query = "no such product".to_string();
        let frame = render(&base, &filter);
        assert_eq!(frame.kpis.count, 0);
        assert_eq!(frame.kpis.mean, None);
        assert_eq!(format_money(frame.kpis.mean), KPI_PLACEHOLDER);
        assert!(frame.price_spark.is_empty());
        assert!(frame.histogram.is_empty());
        assert!(frame.category_means.is_empty());
    }

    #[test]
    fn mean_and_median_formatting() {
        let base = vec![
            product(1, "a", 10.0, None),
            product(2, "b", 20.0, None),
            product(3, "c", 40.0, None),
        ];
        let filter = FilterState::unfiltered(&base);
        let frame = render(&base, &filter);
        assert_eq!(format_money(frame.kpis.mean), "$23.33");
        assert_eq!(format_money(frame.kpis.median), "$20.00");
    }

    #[test]
    fn median_of_even_count_averages_the_middle_pair() {
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(&[1.0, 2.0, 3.0]), 2.0);
    }

    #[test]
    fn small_series_is_used_verbatim() {
        let prices: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let points = downsample_sorted(&prices, SPARK_POINTS);
        assert_eq!(points.len(), 10);
        assert_eq!(points[3], [3.0, 3.0]);
    }

    #[test]
    fn downsampling_truncates_interpolated_indices() {
        // 100 sorted values into 40 points: pos_i = i * 99 / 39, truncated.
        let prices: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let points = downsample_sorted(&prices, SPARK_POINTS);
        assert_eq!(points.len(), SPARK_POINTS);
        assert_eq!(points[0], [0.0, 0.0]);
        assert_eq!(points[1][1], 2.0); // trunc(2.538...)
        assert_eq!(points[2][1], 5.0); // trunc(5.076...)
        assert_eq!(points[39][1], 99.0);
    }

    #[test]
    fn histogram_is_normalized_to_the_fullest_bin() {
        let prices = vec![0.0, 0.1, 0.2, 10.0, 19.9];
        let bars = histogram(&prices, HISTOGRAM_BINS);
        assert_eq!(bars.len(), HISTOGRAM_BINS);
        // First bin holds three of five values and normalizes to 1.0.
        assert_eq!(bars[0][1], 1.0);
        let max_y = bars.iter().map(|b| b[1]).fold(0.0, f64::max);
        assert_eq!(max_y, 1.0);
        // The maximum value lands in the last bin despite the open edge.
        assert!(bars[19][1] > 0.0);
    }

    #[test]
    fn histogram_with_one_price_is_a_single_full_bin() {
        let bars = histogram(&[5.0, 5.0, 5.0], HISTOGRAM_BINS);
        assert_eq!(bars, vec![[5.0, 1.0]]);
    }

    #[test]
    fn category_means_are_grouped_and_sorted() {
        let base = base();
        let filter = FilterState::unfiltered(&base);
        let frame = render(&base, &filter);
        assert_eq!(
            frame.category_means,
            vec![
                ("Kitchen".to_string(), 11.0),
                ("Lighting".to_string(), 60.0)
            ]
        );
    }

    #[test]
    fn category_means_follow_the_filtered_set() {
        let base = base();
        let mut filter = FilterState::unfiltered(&base);
        filter.price_max = 41.0;
        let frame = render(&base, &filter);
        assert_eq!(
            frame.category_means,
            vec![
                ("Kitchen".to_string(), 11.0),
                ("Lighting".to_string(), 40.0)
            ]
        );
    }
}
