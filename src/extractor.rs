use dom_smoothie::Readability;
use lol_html::{element, rewrite_str, RewriteStrSettings};

use crate::error::{RagError, Result};

/// Normalized text for one URL, consumed once by the indexing pipeline.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub source_url: String,
    pub title: String,
    pub text: String,
}

/// Capability for turning rendered HTML into clean page text.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, url: &str, html: &str) -> Result<PageContent>;
}

/// Readability-based extractor: isolates the article content, dropping
/// scripts, styles and navigation chrome, then renders it as plain text.
pub struct ReadabilityExtractor {
    /// Wrap width for the text rendering pass
    width: usize,
}

impl Default for ReadabilityExtractor {
    fn default() -> Self {
        Self { width: 120 }
    }
}

impl ContentExtractor for ReadabilityExtractor {
    fn extract(&self, url: &str, html: &str) -> Result<PageContent> {
        let (title, content_html) = match Readability::new(html, Some(url), None)
            .and_then(|mut r| r.parse())
        {
            Ok(article) => (article.title.to_string(), article.content.to_string()),
            // Pages without enough article structure still index: fall back
            // to the whole document
            Err(e) => {
                tracing::debug!(url, "readability fallback: {e}");
                (extract_title(html), html.to_string())
            }
        };

        let text = html2text::from_read(content_html.as_bytes(), self.width);
        if text.trim().is_empty() {
            return Err(RagError::Extract(format!("no text content in {url}")));
        }

        let title = if title.trim().is_empty() {
            extract_title(html)
        } else {
            title
        };

        Ok(PageContent {
            source_url: url.to_string(),
            title,
            text,
        })
    }
}

/// Extract title from HTML
fn extract_title(html: &str) -> String {
    // Try <title> tag first
    if let Some(start) = html.find("<title>") {
        if let Some(end) = html[start..].find("</title>") {
            let title = html[start + 7..start + end].trim();
            if !title.is_empty() {
                return title.to_string();
            }
        }
    }

    // Fallback to first <h1>
    if let Some(start) = html.find("<h1") {
        if let Some(content_start) = html[start..].find('>') {
            let content_start = start + content_start + 1;
            if let Some(end) = html[content_start..].find("</h1>") {
                let title = html[content_start..content_start + end].trim();
                if !title.is_empty() {
                    return title.to_string();
                }
            }
        }
    }

    "Untitled".to_string()
}

/// Collect raw `href` values from every anchor tag in the document.
///
/// Values come back untouched; the crawler canonicalizes and scope-checks
/// them against the page they were found on.
pub fn extract_links(html: &str) -> Vec<String> {
    let mut links = Vec::new();
    let result = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("a[href]", |el| {
                if let Some(href) = el.get_attribute("href") {
                    links.push(href);
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    );

    // Malformed markup yields whatever anchors were seen before the failure
    if let Err(e) = result {
        tracing::debug!("html rewrite stopped early: {e}");
    }

    links
}
