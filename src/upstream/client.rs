// =============================================================================
// Upstream Futures API Client
// =============================================================================
//
// Plain HTTP GET returning a JSON document. The request carries a bounded
// timeout so a hung upstream can never stall the scheduler past one cycle.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Anything that can produce an upstream response body.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch the raw JSON body of the upstream response.
    async fn fetch(&self) -> Result<Value>;
}

/// reqwest-backed source pointed at a fixed URL.
#[derive(Clone)]
pub struct UpstreamClient {
    url: String,
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build reqwest client for UpstreamClient"),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RecordSource for UpstreamClient {
    async fn fetch(&self) -> Result<Value> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("GET {}", self.url))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .context("failed to read upstream response body")?;

        if !status.is_success() {
            anyhow::bail!("upstream returned {}: {}", status, truncate(&text, 200));
        }

        let body: Value =
            serde_json::from_str(&text).context("failed to parse upstream response as JSON")?;

        debug!(url = %self.url, bytes = text.len(), "upstream response received");
        Ok(body)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// =============================================================================
// Test source
// =============================================================================

#[cfg(test)]
pub use stub::StubSource;

#[cfg(test)]
mod stub {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    /// In-memory source returning a settable body, or an error when unset.
    pub struct StubSource {
        body: Mutex<Option<Value>>,
        calls: AtomicUsize,
    }

    impl StubSource {
        pub fn returning(body: Value) -> Self {
            Self {
                body: Mutex::new(Some(body)),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            Self {
                body: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn set_body(&self, body: Option<Value>) {
            *self.body.lock() = body;
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecordSource for StubSource {
        async fn fetch(&self) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.body
                .lock()
                .clone()
                .context("stub upstream unreachable")
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use serde_json::json;

    /// Serve `app` on an ephemeral loopback port and return its base URL.
    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn fetch_returns_json_body() {
        let app = Router::new().route(
            "/api/futures",
            get(|| async {
                axum::Json(json!({
                    "resultData": [{ "expiry_date": "2024-06-27", "ltp": "81000.5" }]
                }))
            }),
        );
        let base = spawn(app).await;
        let client = UpstreamClient::new(
            format!("{base}/api/futures?symbol=sensex"),
            Duration::from_secs(5),
        );

        let body = client.fetch().await.unwrap();
        assert_eq!(body["resultData"][0]["ltp"], "81000.5");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let app = Router::new().route(
            "/api/futures",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let base = spawn(app).await;
        let client = UpstreamClient::new(format!("{base}/api/futures"), Duration::from_secs(5));

        let err = client.fetch().await.unwrap_err();
        assert!(format!("{err:#}").contains("502"));
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        let app = Router::new().route("/api/futures", get(|| async { "not json" }));
        let base = spawn(app).await;
        let client = UpstreamClient::new(format!("{base}/api/futures"), Duration::from_secs(5));

        let err = client.fetch().await.unwrap_err();
        assert!(format!("{err:#}").contains("JSON"));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let app = Router::new().route(
            "/api/futures",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "{}"
            }),
        );
        let base = spawn(app).await;
        let client =
            UpstreamClient::new(format!("{base}/api/futures"), Duration::from_millis(100));

        assert!(client.fetch().await.is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
        assert_eq!(truncate("₹₹₹₹", 2), "₹₹");
    }
}
