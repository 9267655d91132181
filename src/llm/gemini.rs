//! Managed embedding API (Google Generative Language `embedContent`).
//!
//! Quota errors are common on free-tier keys, so every request goes through
//! [`with_backoff`]. Anything that is not a rate-limit signal fails at once.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RelevanceError, Result};
use crate::llm::backoff::{is_rate_limited, with_backoff, Attempt, BackoffConfig};
use crate::llm::embeddings::EmbeddingAdapter;

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

pub struct GeminiEmbedder {
    client: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
    backoff: BackoffConfig,
}

impl GeminiEmbedder {
    pub fn new(client: reqwest::Client, model: &str, api_key: &str, backoff: BackoffConfig) -> Self {
        Self {
            client,
            model: model.trim_start_matches("models/").to_string(),
            api_key: api_key.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            backoff,
        }
    }

    /// Point the adapter at a different host, e.g. a proxy or a mock server.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn attempt(&self, text: &str, timeout: Duration) -> Result<Attempt<Vec<f32>>> {
        let url = format!(
            "{}/v1beta/models/{}:embedContent",
            self.base_url, self.model
        );
        let req = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: vec![Part { text }],
            },
        };

        let resp = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("x-goog-api-key", &self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| RelevanceError::BackendUnavailable(format!("gemini: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let err =
                RelevanceError::BackendUnavailable(format!("gemini returned {status}: {body}"));
            if is_rate_limited(status.as_u16(), &body) {
                return Ok(Attempt::Retry(err));
            }
            return Err(err);
        }

        let body: EmbedContentResponse = resp.json().await.map_err(|e| {
            RelevanceError::BackendUnavailable(format!("failed to parse gemini response: {e}"))
        })?;

        // An empty embedding usually means the request was throttled upstream.
        match body.embedding {
            Some(e) if !e.values.is_empty() => Ok(Attempt::Done(e.values)),
            _ => Ok(Attempt::Retry(RelevanceError::BackendUnavailable(
                "gemini returned an empty embedding".to_string(),
            ))),
        }
    }
}

#[async_trait]
impl EmbeddingAdapter for GeminiEmbedder {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        if self.api_key.is_empty() {
            return Err(RelevanceError::BackendUnavailable(
                "gemini: API key is required".to_string(),
            ));
        }
        with_backoff(&self.backoff, "gemini embedding", |timeout| {
            self.attempt(text, timeout)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_api_key_fails_without_request() {
        let embedder = GeminiEmbedder::new(
            reqwest::Client::new(),
            "text-embedding-004",
            "",
            BackoffConfig::immediate(5),
        )
        .with_base_url("http://127.0.0.1:9");
        let err = embedder.generate_embedding("hello").await.unwrap_err();
        assert!(matches!(err, RelevanceError::BackendUnavailable(ref m) if m.contains("API key")));
    }

    #[test]
    fn test_model_prefix_is_normalized() {
        let embedder = GeminiEmbedder::new(
            reqwest::Client::new(),
            "models/text-embedding-004",
            "k",
            BackoffConfig::default(),
        );
        assert_eq!(embedder.model, "text-embedding-004");
    }
}
