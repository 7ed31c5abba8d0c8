use serde::{Deserialize, Serialize};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::ChatConfig;
use crate::store::RetrievalResult;

/// Answer generation over retrieved chunks via an OpenAI-compatible chat
/// endpoint. This sits outside the core pipeline: retrieval works without
/// it, and `webrag ask` is the only caller.
pub struct AnswerGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl AnswerGenerator {
    pub fn new(config: &ChatConfig, api_key: Option<String>) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = api_key {
            let auth = format!("Bearer {}", key.trim());
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&auth).context("invalid API key")?,
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .default_headers(headers)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    pub async fn generate(&self, question: &str, context: &[RetrievalResult]) -> Result<String> {
        let prompt = build_prompt(question, context);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .context("chat request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("chat request failed ({status}): {body}");
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to parse chat response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("empty chat response"))
    }
}

/// Prompt layout: retrieved context first (most relevant chunk(s)), then
/// the verbatim question.
fn build_prompt(question: &str, context: &[RetrievalResult]) -> String {
    let mut prompt = String::from("Relevant context:\n");
    for result in context {
        prompt.push_str("---\n");
        prompt.push_str(result.content.trim());
        prompt.push('\n');
    }
    prompt.push_str("---\n\nAnswer the question using only the context above. ");
    prompt.push_str("Question: ");
    prompt.push_str(question);
    prompt
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_context_and_question() {
        let context = vec![RetrievalResult {
            content: "Banpu tenure: 2015 to 2021".to_string(),
            source_url: "https://example.com/cv".to_string(),
            distance: 0.1,
        }];
        let prompt = build_prompt("How long at Banpu?", &context);
        assert!(prompt.contains("Banpu tenure: 2015 to 2021"));
        assert!(prompt.ends_with("Question: How long at Banpu?"));
    }

    #[test]
    fn test_chat_response_parses() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"six years"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "six years");
    }
}
