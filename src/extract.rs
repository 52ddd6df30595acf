//! Paginated extraction of the product catalog into the raw CSV.

use std::path::Path;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use serde_json::Value;
use tracing::info;

use crate::fetch::FetchClient;
use crate::flatten::flatten_records;

pub const DEFAULT_BASE_URL: &str = "https://api.escuelajs.co/api/v1";
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const RAW_CSV: &str = "data/products_raw.csv";

/// Fetch every product, one page at a time. A page shorter than requested
/// marks the end of the catalog; an exact-multiple total costs one extra
/// request that returns an empty page.
pub async fn fetch_all_products(
    client: &FetchClient,
    base_url: &str,
    page_size: usize,
) -> Result<Vec<Value>> {
    let url = format!("{}/products", base_url.trim_end_matches('/'));
    let mut all: Vec<Value> = Vec::new();
    let mut offset = 0usize;

    let pb = ProgressBar::new_spinner();
    loop {
        let params = [
            ("limit", page_size.to_string()),
            ("offset", offset.to_string()),
        ];
        let page = client.get_json(&url, &params).await?;
        let batch = page
            .as_array()
            .with_context(|| format!("{url} did not return a JSON array"))?;
        if batch.is_empty() {
            break;
        }
        let fetched = batch.len();
        all.extend(batch.iter().cloned());
        offset += fetched;
        pb.set_message(format!("{} products", all.len()));
        pb.tick();
        if fetched < page_size {
            break;
        }
    }
    pb.finish_and_clear();

    info!("Fetched {} products from {}", all.len(), url);
    Ok(all)
}

/// Run the full extraction: paginate, flatten, write the raw CSV.
/// Returns the number of extracted rows.
pub async fn extract_products(
    client: &FetchClient,
    base_url: &str,
    page_size: usize,
    out: &Path,
) -> Result<usize> {
    let records = fetch_all_products(client, base_url, page_size).await?;
    let table = flatten_records(&records);
    table.write_csv(out)?;
    Ok(table.row_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::test_server::{json_response, no_delay_retry, serve_script};
    use crate::fetch::FetchClient;
    use crate::table::Table;
    use std::sync::atomic::Ordering;

    fn page_json(start: usize, len: usize) -> String {
        let items: Vec<String> = (start..start + len)
            .map(|i| format!(r#"{{"id":{i},"title":"p{i}","price":{i}}}"#))
            .collect();
        json_response(&format!("[{}]", items.join(",")))
    }

    #[tokio::test]
    async fn short_page_terminates_pagination() {
        let (base, hits) = serve_script(vec![
            page_json(0, 100),
            page_json(100, 100),
            page_json(200, 100),
            page_json(300, 40),
        ]);
        let client = FetchClient::new(no_delay_retry(5));
        let records = fetch_all_products(&client, &base, 100).await.unwrap();
        assert_eq!(records.len(), 340);
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exact_multiple_total_costs_one_empty_page() {
        let (base, hits) = serve_script(vec![
            page_json(0, 100),
            page_json(100, 100),
            json_response("[]"),
        ]);
        let client = FetchClient::new(no_delay_retry(5));
        let records = fetch_all_products(&client, &base, 100).await.unwrap();
        assert_eq!(records.len(), 200);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_array_body_fails_extraction() {
        let (base, _hits) = serve_script(vec![json_response("{\"error\":\"nope\"}")]);
        let client = FetchClient::new(no_delay_retry(5));
        let err = fetch_all_products(&client, &base, 100).await.unwrap_err();
        assert!(err.to_string().contains("JSON array"));
    }

    #[tokio::test]
    async fn extract_writes_flattened_csv() {
        let (base, _hits) = serve_script(vec![json_response(
            r#"[{"id":1,"title":"Mug","price":"9.5","category":{"id":2,"name":"Kitchen"},"images":["a.jpg"]}]"#,
        )]);
        let client = FetchClient::new(no_delay_retry(5));
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("raw.csv");
        let count = extract_products(&client, &base, 100, &out).await.unwrap();
        assert_eq!(count, 1);

        let table = Table::read_csv(&out).unwrap();
        assert_eq!(
            table.columns,
            vec!["id", "title", "price", "category.id", "category.name", "images"]
        );
        assert_eq!(table.rows[0][5], r#"["a.jpg"]"#);
    }
}
