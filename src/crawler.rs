use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

use crate::error::{RagError, Result};
use crate::extractor::{extract_links, ContentExtractor};
use crate::fetcher::PageFetcher;
use crate::pipeline::IndexingPipeline;

/// Canonical form of a URL: parsed, fragment dropped, serialized back.
/// Two URLs with the same canonical form are the same crawl target.
pub fn canonicalize(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Resolve a (possibly relative) href against the page it was found on.
pub fn resolve_link(page_url: &str, href: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    let mut resolved = base.join(href).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

/// Same-site scope: a URL is in scope when its canonical form starts with
/// the canonical seed. Fixed for the whole run.
pub struct ScopeRule {
    prefix: String,
}

impl ScopeRule {
    pub fn from_seed(canonical_seed: &str) -> Self {
        Self {
            prefix: canonical_seed.to_string(),
        }
    }

    pub fn contains(&self, canonical_url: &str) -> bool {
        canonical_url.starts_with(&self.prefix)
    }
}

/// Lifecycle of one crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// A page the run gave up on, with the reason it was skipped.
#[derive(Debug, Clone)]
pub struct SkippedPage {
    pub url: String,
    pub reason: String,
}

/// Summary of one crawl run.
#[derive(Debug)]
pub struct CrawlReport {
    pub state: CrawlState,
    pub pages_visited: usize,
    pub pages_skipped: Vec<SkippedPage>,
    pub chunks_indexed: usize,
    /// Set when the run ended as `Failed`.
    pub failure: Option<String>,
    /// True when the stop flag ended the run before the queue drained.
    pub stopped_early: bool,
}

impl CrawlReport {
    fn new() -> Self {
        Self {
            state: CrawlState::Idle,
            pages_visited: 0,
            pages_skipped: Vec::new(),
            chunks_indexed: 0,
            failure: None,
            stopped_early: false,
        }
    }
}

/// Breadth-first same-site crawler.
///
/// One page is processed to completion (fetch, extract, index, link
/// discovery) before the next is dequeued, so the visited set needs no
/// locking. A failed page is recorded and the run continues; only a store
/// outage aborts the whole run.
pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn ContentExtractor>,
    pipeline: Arc<IndexingPipeline>,
    max_pages: usize,
    stop: Arc<AtomicBool>,
}

impl Crawler {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn ContentExtractor>,
        pipeline: Arc<IndexingPipeline>,
        max_pages: usize,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            pipeline,
            max_pages,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that cancels the run between two queued pages.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub async fn crawl(&self, seed_url: &str) -> Result<CrawlReport> {
        let seed = canonicalize(seed_url).ok_or_else(|| {
            RagError::InvalidConfig(format!("invalid seed URL: {seed_url}"))
        })?;
        let scope = ScopeRule::from_seed(&seed);

        let mut report = CrawlReport::new();
        report.state = CrawlState::Running;

        // Queue may hold duplicates of not-yet-visited URLs; they collapse
        // at dequeue time
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        queue.push_back(seed.clone());

        while let Some(target) = queue.pop_front() {
            if visited.contains(&target) {
                continue;
            }
            if self.stop.load(Ordering::Acquire) {
                tracing::info!("crawl stopped by request, {} pages left queued", queue.len() + 1);
                report.stopped_early = true;
                break;
            }
            if report.pages_visited >= self.max_pages {
                tracing::info!(max_pages = self.max_pages, "crawl reached page limit");
                report.stopped_early = true;
                break;
            }

            visited.insert(target.clone());
            tracing::info!(url = %target, "processing page");

            let html = match self.fetcher.fetch(&target).await {
                Ok(html) => html,
                Err(e) => {
                    if target == seed {
                        // Nothing was indexed; there is no partial run to keep
                        report.state = CrawlState::Failed;
                        report.failure = Some(format!("seed fetch failed: {e}"));
                        return Ok(report);
                    }
                    tracing::warn!(url = %target, "skipping page: {e}");
                    report.pages_skipped.push(SkippedPage {
                        url: target,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match self.process_page(&target, &html).await {
                Ok(chunks) => {
                    report.pages_visited += 1;
                    report.chunks_indexed += chunks;
                }
                Err(e @ RagError::Store(_)) => {
                    // The store backend is gone; everything indexed so far
                    // stays valid for a later resume
                    tracing::error!(url = %target, "aborting crawl: {e}");
                    report.state = CrawlState::Failed;
                    report.failure = Some(RagError::CrawlAborted(e.to_string()).to_string());
                    return Ok(report);
                }
                Err(e) => {
                    tracing::warn!(url = %target, "skipping page: {e}");
                    report.pages_skipped.push(SkippedPage {
                        url: target,
                        reason: e.to_string(),
                    });
                    continue;
                }
            }

            for href in extract_links(&html) {
                // Relative links resolve against the current page, not the seed
                let Some(link) = resolve_link(&target, &href) else {
                    continue;
                };
                if scope.contains(&link) && !visited.contains(&link) {
                    queue.push_back(link);
                }
            }
        }

        if report.state == CrawlState::Running {
            report.state = CrawlState::Completed;
        }
        Ok(report)
    }

    async fn process_page(&self, url: &str, html: &str) -> Result<usize> {
        let page = self.extractor.extract(url, html)?;
        tracing::debug!(url, title = %page.title, "extracted content");
        let outcome = self.pipeline.index(&page.source_url, &page.text).await?;
        Ok(outcome.chunks_processed)
    }
}
