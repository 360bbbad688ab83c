//! HTTP access to the results server.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::error::{LiveError, Result};
use crate::lock;

/// User agent string for requests.
const USER_AGENT_VALUE: &str = concat!("elect-live/", env!("CARGO_PKG_VERSION"));

/// Something that can GET a JSON document.
///
/// The seam between the live data layer and the network, so the layer can
/// be driven by [`MemoryFetcher`] in tests.
pub trait Fetch: Send + Sync {
    /// Fetch `url` and parse the body as JSON.
    fn get_json<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Value>>;
}

/// [`Fetch`] implementation backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher. Without a timeout, the transport defaults apply.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| LiveError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    async fn fetch(&self, url: &str) -> Result<Value> {
        tracing::trace!("GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LiveError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body: Value = response.json().await?;
        Ok(body)
    }
}

impl Fetch for HttpFetcher {
    fn get_json<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Value>> {
        self.fetch(url).boxed()
    }
}

/// Cache-busting token for `now`: the number of whole windows since the
/// epoch, so the token changes once per window.
#[must_use]
pub fn cachebust_token(now: DateTime<Utc>, window: Duration) -> i64 {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX).max(1);
    now.timestamp_millis().div_euclid(window_ms)
}

/// In-memory [`Fetch`] implementation.
///
/// Responses are keyed by URL without its query string, so cache-busted
/// pointer file requests all hit the same entry. Unknown URLs answer
/// HTTP 404. Every request is recorded.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    responses: Mutex<HashMap<String, Result<Value>>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    /// Create a fetcher with no responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `body`.
    pub fn set_json(&self, url: &str, body: Value) {
        lock(&self.responses).insert(strip_query(url).to_string(), Ok(body));
    }

    /// Answer `url` with `error`.
    pub fn set_error(&self, url: &str, error: LiveError) {
        lock(&self.responses).insert(strip_query(url).to_string(), Err(error));
    }

    /// Forget the response for `url`.
    pub fn remove(&self, url: &str) {
        lock(&self.responses).remove(strip_query(url));
    }

    /// Every requested URL, query included, in request order.
    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }

    /// Number of requests for `url`, ignoring query strings.
    pub fn request_count(&self, url: &str) -> usize {
        let key = strip_query(url);
        lock(&self.requests)
            .iter()
            .filter(|requested| strip_query(requested) == key)
            .count()
    }
}

impl Fetch for MemoryFetcher {
    fn get_json<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Value>> {
        lock(&self.requests).push(url.to_string());
        let response = lock(&self.responses)
            .get(strip_query(url))
            .cloned()
            .unwrap_or_else(|| {
                Err(LiveError::Http {
                    status: 404,
                    url: url.to_string(),
                })
            });
        futures_util::future::ready(response).boxed()
    }
}

fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(path, _)| path)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_cachebust_changes_per_window() {
        let window = Duration::from_secs(30);
        let start = Utc.timestamp_millis_opt(1_553_450_400_000).unwrap();
        let token = cachebust_token(start, window);
        assert_eq!(token, 1_553_450_400_000 / 30_000);

        let same = start + chrono::Duration::seconds(29);
        assert_eq!(cachebust_token(same, window), token);

        let next = start + chrono::Duration::seconds(30);
        assert_eq!(cachebust_token(next, window), token + 1);
    }

    #[tokio::test]
    async fn test_memory_fetcher_ignores_query() {
        let fetcher = MemoryFetcher::new();
        fetcher.set_json("http://localhost:8000/data/latest.json", json!({"pointers": []}));

        let body = fetcher
            .get_json("http://localhost:8000/data/latest.json?cachebust=1")
            .await
            .unwrap();
        assert_eq!(body, json!({"pointers": []}));
        fetcher
            .get_json("http://localhost:8000/data/latest.json?cachebust=2")
            .await
            .unwrap();

        assert_eq!(
            fetcher.request_count("http://localhost:8000/data/latest.json"),
            2
        );
    }

    #[tokio::test]
    async fn test_memory_fetcher_errors() {
        let fetcher = MemoryFetcher::new();
        let missing = fetcher.get_json("http://localhost:8000/x.json").await;
        assert!(matches!(missing, Err(LiveError::Http { status: 404, .. })));

        fetcher.set_error(
            "http://localhost:8000/x.json",
            LiveError::Network("refused".to_string()),
        );
        let failed = fetcher.get_json("http://localhost:8000/x.json").await;
        assert_eq!(failed, Err(LiveError::Network("refused".to_string())));
    }

    #[test]
    fn test_http_fetcher_builds() {
        assert!(HttpFetcher::new(Some(Duration::from_secs(5))).is_ok());
        assert!(HttpFetcher::new(None).is_ok());
    }
}
