use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::Result;
use crate::store::{RetrievalResult, VectorStore};

/// Embeds a question and retrieves the most relevant stored chunks.
///
/// Must share the `Embedder` configuration used at indexing time; mixing
/// embedding spaces makes distances meaningless. Results come back ordered
/// by ascending cosine distance (most relevant first).
pub struct QueryService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl QueryService {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    pub async fn query(&self, question: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        let cleaned = clean_question(question);
        let vector = self.embedder.embed(&cleaned).await?;

        let mut results = self.store.query(&vector, k).await?;
        // The store contract already orders by distance; keep the guarantee
        // even for stores that return candidates unsorted
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(k);

        Ok(results)
    }
}

/// Strip markdown noise that ends up in questions pasted from rendered
/// pages: `* * *` dividers and dash runs anywhere in a line, plus stacked
/// blank lines. Single hyphens inside words survive.
fn clean_question(question: &str) -> String {
    let mut cleaned = String::with_capacity(question.len());
    for line in question.lines() {
        let line = strip_dash_runs(&line.replace("* * *", ""));
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !cleaned.is_empty() {
            cleaned.push('\n');
        }
        cleaned.push_str(trimmed);
    }
    cleaned
}

/// Remove runs of two or more `-` characters, keeping lone hyphens.
fn strip_dash_runs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut dashes = 0usize;
    for ch in line.chars() {
        if ch == '-' {
            dashes += 1;
            continue;
        }
        if dashes == 1 {
            out.push('-');
        }
        dashes = 0;
        out.push(ch);
    }
    if dashes == 1 {
        out.push('-');
    }
    out
}
