use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::crawler::{CrawlReport, CrawlState};
use crate::store::{RetrievalResult, SourceInfo, StoreStats};

pub fn format_results(results: &[RetrievalResult]) -> String {
    if results.is_empty() {
        return "No results found".to_string();
    }

    let mut output = String::new();

    for result in results {
        output.push_str(&"━".repeat(60));
        output.push('\n');

        output.push_str(&result.source_url.bright_black().to_string());
        output.push('\n');

        // Content preview (first 300 chars)
        let content = result.content.trim();
        if content.chars().count() > 300 {
            output.push_str(&format!("{}...", truncate_chars(content, 300)));
        } else {
            output.push_str(content);
        }
        output.push('\n');

        let score_pct = (result.relevance_score() * 100.0) as u32;
        output.push_str(&format!("{}% relevant", score_pct).green().to_string());
        output.push_str("\n\n");
    }

    output
}

pub fn format_crawl_report(report: &CrawlReport) -> String {
    let mut output = String::new();

    let headline = match report.state {
        CrawlState::Completed if report.stopped_early => "Crawl stopped early".yellow().bold(),
        CrawlState::Completed => "Crawl completed".green().bold(),
        CrawlState::Failed => "Crawl failed".red().bold(),
        CrawlState::Idle | CrawlState::Running => "Crawl in progress".normal(),
    };
    output.push_str(&headline.to_string());
    output.push('\n');

    output.push_str(&format!("Pages visited: {}", report.pages_visited));
    output.push('\n');
    output.push_str(&format!("Chunks indexed: {}", report.chunks_indexed));
    output.push('\n');

    if !report.pages_skipped.is_empty() {
        output.push_str(&format!("Pages skipped: {}", report.pages_skipped.len()));
        output.push('\n');
        for skipped in &report.pages_skipped {
            output.push_str(
                &format!("  {} — {}", skipped.url, skipped.reason)
                    .bright_black()
                    .to_string(),
            );
            output.push('\n');
        }
    }

    if let Some(failure) = &report.failure {
        output.push_str(&failure.red().to_string());
        output.push('\n');
    }

    output
}

pub fn format_stats(stats: &StoreStats) -> String {
    let mut output = String::new();

    output.push_str(&"Index Statistics".bold().to_string());
    output.push('\n');
    output.push_str(&format!("Total Sources: {}", stats.total_sources));
    output.push('\n');
    output.push_str(&format!("Total Chunks: {}", stats.total_chunks));
    output.push('\n');

    if stats.total_sources > 0 {
        let avg = stats.total_chunks / stats.total_sources;
        output.push_str(&format!("Average Chunks/Source: {}", avg));
        output.push('\n');
    }

    if let Some(oldest) = stats.oldest_indexed {
        output.push_str(&format!("Oldest Indexed: {}", format_relative_time(oldest)));
        output.push('\n');
    }

    if let Some(newest) = stats.newest_indexed {
        output.push_str(&format!("Newest Indexed: {}", format_relative_time(newest)));
        output.push('\n');
    }

    output
}

pub fn format_source_list(sources: &[SourceInfo]) -> String {
    if sources.is_empty() {
        return "No sources indexed".to_string();
    }

    let mut output = String::new();
    for source in sources {
        output.push_str(&source.url.blue().to_string());
        output.push('\n');
        output.push_str(
            &format!(
                "  {} chunks, indexed {}",
                source.chunk_count,
                format_relative_time(source.indexed_at)
            )
            .bright_black()
            .to_string(),
        );
        output.push('\n');
    }
    output
}

fn format_relative_time(time: DateTime<Utc>) -> String {
    let delta = Utc::now() - time;
    if delta.num_days() > 0 {
        format!("{} days ago", delta.num_days())
    } else if delta.num_hours() > 0 {
        format!("{} hours ago", delta.num_hours())
    } else if delta.num_minutes() > 0 {
        format!("{} minutes ago", delta.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hello", 10), "hello");
        // Thai characters are multi-byte; truncation must not split them
        let thai = "ทำงาน";
        assert_eq!(truncate_chars(thai, 2).chars().count(), 2);
    }

    #[test]
    fn test_empty_results_message() {
        assert_eq!(format_results(&[]), "No results found");
    }

    #[test]
    fn test_relative_time_buckets() {
        let now = Utc::now();
        assert_eq!(format_relative_time(now), "just now");
        assert_eq!(
            format_relative_time(now - chrono::Duration::days(3)),
            "3 days ago"
        );
    }
}
