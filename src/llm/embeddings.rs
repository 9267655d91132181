use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RelevanceError, Result};
use crate::llm::backoff::{is_rate_limited, with_backoff, Attempt, BackoffConfig};
use crate::llm::gemini::GeminiEmbedder;
use crate::models::EmbeddingOptions;

/// Cut `text` to at most `max_bytes` bytes on a UTF-8 char boundary.
/// `None` returns the text unchanged.
pub fn truncate_for_embedding(text: &str, max_bytes: Option<usize>) -> &str {
    let Some(max) = max_bytes else {
        return text;
    };
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    tracing::debug!("Embedding input cut from {} to {end} bytes", text.len());
    &text[..end]
}

/// Something that turns text into a fixed-length vector.
#[async_trait]
pub trait EmbeddingAdapter: Send + Sync {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>>;
}

#[async_trait]
impl<T: EmbeddingAdapter + ?Sized> EmbeddingAdapter for Arc<T> {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        (**self).generate_embedding(text).await
    }
}

#[async_trait]
impl<T: EmbeddingAdapter + ?Sized> EmbeddingAdapter for Box<T> {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        (**self).generate_embedding(text).await
    }
}

/// The closed set of supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    LocalHttp,
    Gemini,
    OpenAi,
}

impl Provider {
    /// Parse a provider identifier, case-insensitively.
    pub fn parse(id: &str) -> Result<Self> {
        match id.trim().to_lowercase().as_str() {
            "local-http" | "ollama" | "local" => Ok(Provider::LocalHttp),
            "gemini" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAi),
            _ => Err(RelevanceError::UnknownProvider(id.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::LocalHttp => "local-http",
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
        }
    }
}

/// Shared HTTP client with bounded connect and request time.
pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()?)
}

/// Build the adapter named by `opts.provider`.
///
/// Fails with [`RelevanceError::UnknownProvider`] before any network traffic;
/// never substitutes a different provider.
pub fn new_embedding_provider(
    opts: &EmbeddingOptions,
    backoff: &BackoffConfig,
) -> Result<Box<dyn EmbeddingAdapter>> {
    let provider = Provider::parse(&opts.provider)?;
    let client = http_client()?;
    tracing::debug!(
        "Embedding provider {} with model {}",
        provider.as_str(),
        opts.model
    );

    Ok(match provider {
        Provider::LocalHttp => Box::new(LocalHttpEmbedder::new(
            client,
            &opts.model,
            &opts.endpoint,
        )),
        Provider::Gemini => {
            let mut embedder =
                GeminiEmbedder::new(client, &opts.model, &opts.api_key, backoff.clone());
            if !opts.endpoint.is_empty() {
                embedder = embedder.with_base_url(&opts.endpoint);
            }
            Box::new(embedder)
        }
        Provider::OpenAi => Box::new(OpenAiEmbedder::new(
            client,
            &opts.model,
            &opts.endpoint,
            &opts.api_key,
            backoff.clone(),
        )),
    })
}

// ─── Local HTTP (Ollama-compatible) ──────────────────────

#[derive(Serialize)]
struct LocalEmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct LocalEmbedResponse {
    embedding: Vec<f32>,
}

/// POSTs `{model, prompt}` to an Ollama-style `/api/embeddings` endpoint.
pub struct LocalHttpEmbedder {
    client: reqwest::Client,
    model: String,
    endpoint: String,
}

impl LocalHttpEmbedder {
    pub fn new(client: reqwest::Client, model: &str, endpoint: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingAdapter for LocalHttpEmbedder {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        if self.endpoint.is_empty() {
            return Err(RelevanceError::BackendUnavailable(
                "local embedding endpoint is required".to_string(),
            ));
        }

        let req = LocalEmbedRequest {
            model: &self.model,
            prompt: text,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                RelevanceError::BackendUnavailable(format!(
                    "request to {} failed: {e}",
                    self.endpoint
                ))
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RelevanceError::BackendUnavailable(format!(
                "{} returned {status}: {body}",
                self.endpoint
            )));
        }

        let body: LocalEmbedResponse = resp.json().await.map_err(|e| {
            RelevanceError::BackendUnavailable(format!(
                "failed to parse response from {}: {e}",
                self.endpoint
            ))
        })?;

        Ok(body.embedding)
    }
}

// ─── OpenAI-compatible ───────────────────────────────────

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    embedding: Vec<f32>,
}

/// Calls `{base}/v1/embeddings` with a bearer token, retrying on 429.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
    backoff: BackoffConfig,
}

impl OpenAiEmbedder {
    pub fn new(
        client: reqwest::Client,
        model: &str,
        base_url: &str,
        api_key: &str,
        backoff: BackoffConfig,
    ) -> Self {
        let base_url = if base_url.is_empty() {
            DEFAULT_OPENAI_BASE_URL
        } else {
            base_url
        };
        Self {
            client,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            backoff,
        }
    }

    async fn attempt(&self, text: &str, timeout: Duration) -> Result<Attempt<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let req = OpenAiEmbedRequest {
            model: &self.model,
            input: vec![text],
        };

        let resp = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&req)
            .send()
            .await
            .map_err(|e| RelevanceError::BackendUnavailable(format!("openai: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let err =
                RelevanceError::BackendUnavailable(format!("openai returned {status}: {body}"));
            if is_rate_limited(status.as_u16(), &body) {
                return Ok(Attempt::Retry(err));
            }
            return Err(err);
        }

        let body: OpenAiEmbedResponse = resp.json().await.map_err(|e| {
            RelevanceError::BackendUnavailable(format!("failed to parse openai response: {e}"))
        })?;

        match body.data.into_iter().next() {
            Some(d) => Ok(Attempt::Done(d.embedding)),
            None => Err(RelevanceError::BackendUnavailable(
                "openai returned no embedding".to_string(),
            )),
        }
    }
}

#[async_trait]
impl EmbeddingAdapter for OpenAiEmbedder {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        with_backoff(&self.backoff, "openai embedding", |timeout| {
            self.attempt(text, timeout)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse_aliases() {
        assert_eq!(Provider::parse("local-http").unwrap(), Provider::LocalHttp);
        assert_eq!(Provider::parse("Ollama").unwrap(), Provider::LocalHttp);
        assert_eq!(Provider::parse("local").unwrap(), Provider::LocalHttp);
        assert_eq!(Provider::parse("GEMINI").unwrap(), Provider::Gemini);
        assert_eq!(Provider::parse("openai").unwrap(), Provider::OpenAi);
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let err = Provider::parse("anthropic").unwrap_err();
        assert!(matches!(err, RelevanceError::UnknownProvider(ref p) if p == "anthropic"));
    }

    #[test]
    fn test_factory_rejects_unknown_provider() {
        let opts = EmbeddingOptions {
            provider: "word2vec".to_string(),
            ..Default::default()
        };
        let err = new_embedding_provider(&opts, &BackoffConfig::default()).err();
        assert!(matches!(err, Some(RelevanceError::UnknownProvider(_))));
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let text = "é".repeat(100);
        let out = truncate_for_embedding(&text, Some(51));
        assert_eq!(out.len(), 50);
        assert!(out.chars().all(|c| c == 'é'));

        assert_eq!(truncate_for_embedding("short", Some(50)), "short");
    }

    #[test]
    fn test_truncate_disabled_keeps_full_text() {
        let text = "x".repeat(20_000);
        assert_eq!(truncate_for_embedding(&text, None).len(), 20_000);
    }

    #[tokio::test]
    async fn test_local_embedder_requires_endpoint() {
        let embedder = LocalHttpEmbedder::new(reqwest::Client::new(), "m", "");
        let err = embedder.generate_embedding("hello").await.unwrap_err();
        assert!(matches!(err, RelevanceError::BackendUnavailable(_)));
    }
}
