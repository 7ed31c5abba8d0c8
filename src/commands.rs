use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::answer::AnswerGenerator;
use crate::chunker::TextChunker;
use crate::cli::Commands;
use crate::config::Config;
use crate::crawler::{CrawlState, Crawler};
use crate::embedding::{Embedder, HttpEmbedder};
use crate::extractor::ReadabilityExtractor;
use crate::fetcher::HttpFetcher;
use crate::formatting;
use crate::pipeline::IndexingPipeline;
use crate::query::QueryService;
use crate::store::{LanceStore, VectorStore};

/// Open the store, probing the embedder once to learn the vector dimension
/// the index must carry.
async fn open_store(embedder: &dyn Embedder) -> Result<Arc<dyn VectorStore>> {
    let probe = embedder
        .embed("test")
        .await
        .context("embedding backend unavailable")?;
    let path = crate::storage::get_index_path()?;
    let store = LanceStore::new(&path, probe.len()).await?;
    Ok(Arc::new(store))
}

pub async fn execute(config: &Config, command: Commands) -> Result<()> {
    match command {
        Commands::Crawl { url, max_pages } => {
            let embedder: Arc<dyn Embedder> =
                Arc::new(HttpEmbedder::new(&config.embedding, Config::api_key())?);
            let store = open_store(embedder.as_ref()).await?;

            let chunker = TextChunker::new(config.crawl.chunk_size, config.crawl.chunk_overlap)?;
            let pipeline = Arc::new(IndexingPipeline::new(
                chunker,
                embedder,
                store,
                config.embedding.concurrency,
            ));

            let fetcher = Arc::new(HttpFetcher::new(
                Duration::from_secs(config.crawl.fetch_timeout_secs),
                config.crawl.fetch_retries,
            )?);
            let crawler = Crawler::new(
                fetcher,
                Arc::new(ReadabilityExtractor::default()),
                pipeline,
                max_pages.unwrap_or(config.crawl.max_pages),
            );

            // Ctrl-C cancels between pages, leaving the index resumable
            let stop = crawler.stop_flag();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("stop requested, finishing current page");
                    stop.store(true, std::sync::atomic::Ordering::Release);
                }
            });

            let report = crawler.crawl(&url).await?;
            println!("{}", formatting::format_crawl_report(&report));

            if report.state == CrawlState::Failed {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Query { question, limit } => {
            let embedder: Arc<dyn Embedder> =
                Arc::new(HttpEmbedder::new(&config.embedding, Config::api_key())?);
            let store = open_store(embedder.as_ref()).await?;

            let service = QueryService::new(embedder, store);
            let results = service.query(&question, limit).await?;
            println!("{}", formatting::format_results(&results));
            Ok(())
        }

        Commands::Ask { question } => {
            let embedder: Arc<dyn Embedder> =
                Arc::new(HttpEmbedder::new(&config.embedding, Config::api_key())?);
            let store = open_store(embedder.as_ref()).await?;

            let service = QueryService::new(embedder, store);
            let results = service
                .query(&question, config.search.max_results)
                .await?;

            if results.is_empty() {
                println!("No indexed content to answer from. Run `webrag crawl` first.");
                return Ok(());
            }

            let generator = AnswerGenerator::new(&config.chat, Config::api_key())?;
            let answer = generator.generate(&question, &results).await?;
            println!("{answer}");
            Ok(())
        }

        Commands::Sources { limit } => {
            let embedder: Arc<dyn Embedder> =
                Arc::new(HttpEmbedder::new(&config.embedding, Config::api_key())?);
            let store = open_store(embedder.as_ref()).await?;
            let sources = store.list_sources(limit).await?;
            println!("{}", formatting::format_source_list(&sources));
            Ok(())
        }

        Commands::Stats => {
            let embedder: Arc<dyn Embedder> =
                Arc::new(HttpEmbedder::new(&config.embedding, Config::api_key())?);
            let store = open_store(embedder.as_ref()).await?;
            let stats = store.stats().await?;
            println!("{}", formatting::format_stats(&stats));
            Ok(())
        }

        Commands::Forget { url } => {
            let embedder: Arc<dyn Embedder> =
                Arc::new(HttpEmbedder::new(&config.embedding, Config::api_key())?);
            let store = open_store(embedder.as_ref()).await?;
            store.delete_source(&url).await?;
            println!("Forgot {url}");
            Ok(())
        }
    }
}
