/// Error taxonomy for the crawl/index/query pipeline.
///
/// Adapter-boundary failures (`Fetch`, `Extract`, `Embedding`, `Store`) are
/// recoverable at the crawler's per-page boundary; `InvalidConfig` and
/// `NotInitialized` are caller errors and fail fast; `CrawlAborted` means the
/// whole run stopped because a backend became unreachable.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("not initialized: {0}")]
    NotInitialized(String),

    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("content extraction failed: {0}")]
    Extract(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("vector store error: {0}")]
    Store(String),

    #[error("crawl aborted: {0}")]
    CrawlAborted(String),
}

pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_failure_site() {
        let err = RagError::Fetch {
            url: "https://example.com/p".to_string(),
            reason: "HTTP error: 503".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "fetch failed for https://example.com/p: HTTP error: 503"
        );

        assert_eq!(
            RagError::CrawlAborted("stub store outage".to_string()).to_string(),
            "crawl aborted: stub store outage"
        );
        assert!(RagError::InvalidConfig("bad overlap".to_string())
            .to_string()
            .starts_with("invalid configuration"));
    }

    #[test]
    fn test_is_std_error() {
        fn assert_error<E: std::error::Error + Send + Sync + 'static>() {}
        assert_error::<RagError>();
    }
}
