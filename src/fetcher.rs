use async_trait::async_trait;
use std::time::Duration;

use crate::error::{RagError, Result};

/// Capability for turning a URL into its HTML body.
///
/// The production implementation fetches over HTTP; a rendering fetcher
/// (headless browser) would implement the same trait. Tests use canned maps.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// HTTP fetcher with a bounded timeout and a small retry budget.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_retries: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_retries: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("webrag/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RagError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries,
        })
    }

    fn retry_backoff(attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        Duration::from_millis(500 * (1 << capped))
    }

    fn should_retry(status: reqwest::StatusCode) -> bool {
        status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<String, (String, bool)> {
        let response = self.client.get(url).send().await.map_err(|e| {
            let retryable = e.is_timeout() || e.is_connect() || e.is_request();
            (format!("request failed: {e}"), retryable)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err((format!("HTTP error: {status}"), Self::should_retry(status)));
        }

        response
            .text()
            .await
            .map_err(|e| (format!("failed to read response body: {e}"), true))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(RagError::Fetch {
                url: url.to_string(),
                reason: "URL cannot be empty".to_string(),
            });
        }
        if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            return Err(RagError::Fetch {
                url: url.to_string(),
                reason: "URL must start with http:// or https://".to_string(),
            });
        }

        let mut attempt = 0usize;
        loop {
            match self.fetch_once(trimmed).await {
                Ok(body) => return Ok(body),
                Err((reason, retryable)) => {
                    if retryable && attempt < self.max_retries {
                        attempt += 1;
                        tracing::debug!(url = %trimmed, attempt, "retrying fetch: {reason}");
                        tokio::time::sleep(Self::retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(RagError::Fetch {
                        url: url.to_string(),
                        reason,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_missing_scheme() {
        let fetcher = HttpFetcher::new(Duration::from_secs(5), 0).unwrap();
        for url in ["example.com", "ftp://example.com", "/path", ""] {
            let err = fetcher.fetch(url).await.unwrap_err();
            assert!(matches!(err, RagError::Fetch { .. }), "{url} should fail");
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(HttpFetcher::retry_backoff(1), Duration::from_millis(1000));
        assert_eq!(HttpFetcher::retry_backoff(2), Duration::from_millis(2000));
        assert_eq!(
            HttpFetcher::retry_backoff(9),
            HttpFetcher::retry_backoff(5)
        );
    }
}
