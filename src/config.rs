// Copyright 2026 Muvon Un Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Crawl configuration: chunking parameters and crawl bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_pages: usize,
    pub fetch_timeout_secs: u64,
    pub fetch_retries: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            max_pages: 500,
            fetch_timeout_secs: 30,
            fetch_retries: 2,
        }
    }
}

/// Embedding configuration for an OpenAI-compatible endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub dimensions: Option<usize>,
    /// Maximum in-flight embedding requests per indexed page
    pub concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: None,
            concurrency: 4,
        }
    }
}

/// Chat configuration for answer generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub endpoint: String,
    pub model: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1".to_string(),
            model: "phi4".to_string(),
        }
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { max_results: 3 }
    }
}

/// Main configuration for webrag
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

impl Config {
    /// Load configuration from config.toml file
    /// First tries to load from system config directory, falls back to embedded template
    pub fn load() -> Result<Self> {
        let config_path = crate::storage::get_system_config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Config doesn't exist, create from template
            let template_content = include_str!("../config-templates/default.toml");
            let config: Self = toml::from_str(template_content)?;

            // Save to system config directory
            if let Some(parent) = config_path.parent() {
                if !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(&config_path, template_content)?;

            Ok(config)
        }
    }

    /// API key for the embedding/chat endpoints, if the backend needs one
    pub fn api_key() -> Option<String> {
        std::env::var("WEBRAG_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chunking_parameters() {
        let config = Config::default();
        assert_eq!(config.crawl.chunk_size, 1000);
        assert_eq!(config.crawl.chunk_overlap, 200);
    }

    #[test]
    fn test_template_parses() {
        let template = include_str!("../config-templates/default.toml");
        let config: Config = toml::from_str(template).unwrap();
        assert_eq!(config.search.max_results, 3);
        assert_eq!(config.embedding.concurrency, 4);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("[crawl]\nchunk_size = 500\nchunk_overlap = 50\nmax_pages = 10\nfetch_timeout_secs = 5\nfetch_retries = 1\n").unwrap();
        assert_eq!(config.crawl.chunk_size, 500);
        assert_eq!(config.chat.model, "phi4");
    }
}
