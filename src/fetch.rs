//! HTTP fetch with bounded exponential-backoff retry.

use std::time::Duration;

use serde_json::Value;
use tracing::warn;

/// Retry settings for network requests.
#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first try.
    pub max_attempts: usize,
    /// Base delay doubled per attempt.
    pub base_delay: Duration,
    /// Lower bound on the delay between attempts.
    pub min_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Every attempt failed; carries the last underlying error.
    #[error("GET {url} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        url: String,
        attempts: usize,
        source: reqwest::Error,
    },
}

/// JSON-over-HTTP client. Every failure of the underlying call, including
/// non-2xx statuses and undecodable bodies, is retried under the same policy.
pub struct FetchClient {
    http: reqwest::Client,
    retry: RetryConfig,
}

impl FetchClient {
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            retry,
        }
    }

    /// GET `url` with the given query parameters and decode the JSON body.
    pub async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value, FetchError> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            match self.try_get(url, params).await {
                Ok(value) => return Ok(value),
                Err(source) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(FetchError::RetriesExhausted {
                            url: url.to_owned(),
                            attempts: attempt,
                            source,
                        });
                    }
                    let delay = backoff_delay(&self.retry, attempt);
                    warn!(
                        "GET {} attempt {}/{} failed: {}; retrying in {:.1}s",
                        url,
                        attempt,
                        self.retry.max_attempts,
                        source,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn try_get(&self, url: &str, params: &[(&str, String)]) -> Result<Value, reqwest::Error> {
        self.http
            .get(url)
            .query(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

/// Delay before the retry following `attempt` (1-based): base doubled per
/// attempt, clamped to the configured bounds.
fn backoff_delay(config: &RetryConfig, attempt: usize) -> Duration {
    let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
    let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    let delay = config
        .base_delay
        .checked_mul(u32::try_from(factor).unwrap_or(u32::MAX))
        .unwrap_or(config.max_delay);
    delay.clamp(config.min_delay, config.max_delay)
}

#[cfg(test)]
pub(crate) mod test_server {
    //! Scripted HTTP server for fetch tests: serves the given responses in
    //! order, one connection each, and counts requests.

    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    pub fn serve_script(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for response in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    break;
                };
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        (format!("http://{}", addr), hits)
    }

    pub fn json_response(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    pub fn error_response() -> String {
        "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            .to_string()
    }

    pub fn no_delay_retry(max_attempts: usize) -> super::RetryConfig {
        super::RetryConfig {
            max_attempts,
            base_delay: std::time::Duration::ZERO,
            min_delay: std::time::Duration::ZERO,
            max_delay: std::time::Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_server::{error_response, json_response, no_delay_retry, serve_script};
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn backoff_doubles_within_bounds() {
        let config = RetryConfig::default();
        let delays: Vec<u64> = (1..=4)
            .map(|n| backoff_delay(&config, n).as_secs())
            .collect();
        assert_eq!(delays, vec![2, 4, 8, 10]);
    }

    #[tokio::test]
    async fn succeeds_on_fifth_attempt() {
        let (base, hits) = serve_script(vec![
            error_response(),
            error_response(),
            error_response(),
            error_response(),
            json_response("[1,2,3]"),
        ]);
        let client = FetchClient::new(no_delay_retry(5));
        let value = client.get_json(&format!("{base}/products"), &[]).await.unwrap();
        assert_eq!(value, serde_json::json!([1, 2, 3]));
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn five_failures_surface_the_final_error() {
        let (base, hits) = serve_script(vec![error_response(); 5]);
        let client = FetchClient::new(no_delay_retry(5));
        let err = client
            .get_json(&format!("{base}/products"), &[])
            .await
            .unwrap_err();
        let FetchError::RetriesExhausted { attempts, .. } = err;
        assert_eq!(attempts, 5);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn undecodable_body_is_retried() {
        let (base, hits) = serve_script(vec![
            json_response("not json"),
            json_response("{\"ok\":true}"),
        ]);
        let client = FetchClient::new(no_delay_retry(5));
        let value = client.get_json(&base, &[]).await.unwrap();
        assert_eq!(value["ok"], serde_json::json!(true));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
