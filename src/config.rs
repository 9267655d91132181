use serde::{Deserialize, Serialize};

use crate::llm::backoff::BackoffConfig;
use crate::search::lexical::LEXICAL_LINE_CAP;

pub const DEFAULT_PROVIDER: &str = "local-http";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_LOCAL_ENDPOINT: &str = "http://localhost:11434/api/embeddings";
pub const DEFAULT_MAX_FILES: usize = 20;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Embedding backend selection
    pub embedding: EmbeddingConfig,
    /// Scoring constants and limits
    pub ranking: RankingConfig,
    /// Retry policy for managed embedding APIs
    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "local-http" (alias "ollama", "local"), "gemini" or "openai"
    pub provider: String,
    /// Model name sent to the backend
    pub model: String,
    /// Endpoint URL. Local providers fall back to the Ollama default.
    pub endpoint: Option<String>,
    /// API key for managed providers
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            endpoint: None,
            api_key: None,
        }
    }
}

/// Relative weights of the three hybrid signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    pub embedding: f64,
    pub keyword: f64,
    pub path: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            embedding: 0.7,
            keyword: 0.2,
            path: 0.1,
        }
    }
}

/// Tunable limits for the ranking strategies.
///
/// The defaults are empirical; only the shape of the hybrid combination is
/// fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Result cap when the caller does not supply one
    pub max_files: usize,
    /// Lines scanned by the lexical scorer
    pub lexical_line_cap: usize,
    /// Files above this size are skipped by the keyword-only strategy
    pub lexical_max_file_bytes: u64,
    /// Files above this size are skipped by the embedding-only strategy
    pub embedding_max_file_bytes: u64,
    /// Lines embedded per file by the embedding-only strategy
    pub embedding_line_cap: usize,
    /// Files above this size are skipped by the hybrid strategy
    pub hybrid_max_file_bytes: u64,
    /// Lines embedded per file by the hybrid strategy
    pub hybrid_line_cap: usize,
    /// Raw lexical scores are divided by this before weighting
    pub keyword_normalizer: f64,
    pub weights: HybridWeights,
    /// Byte cap on each text sent to the backend, applied after the line
    /// caps. `None` sends the full capped content. Set it for models with a
    /// small context window.
    pub embedding_max_chars: Option<usize>,
    /// Maximum in-flight embedding requests per run
    pub embedding_concurrency: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            lexical_line_cap: LEXICAL_LINE_CAP,
            lexical_max_file_bytes: 2 * 1024 * 1024,
            embedding_max_file_bytes: 1024 * 1024,
            embedding_line_cap: 500,
            hybrid_max_file_bytes: 2 * 1024 * 1024,
            hybrid_line_cap: 800,
            keyword_normalizer: 10.0,
            weights: HybridWeights::default(),
            embedding_max_chars: None,
            embedding_concurrency: 4,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Ok(url) = std::env::var("EMBEDDING_ENDPOINT") {
            config.embedding.endpoint = Some(url);
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.embedding.api_key = Some(key);
        }
        if let Ok(val) = std::env::var("CODE_CONTEXT_MAX_FILES") {
            if let Ok(v) = val.parse() {
                config.ranking.max_files = v;
            }
        }
        if let Ok(val) = std::env::var("CODE_CONTEXT_EMBED_MAX_CHARS") {
            if let Ok(v) = val.parse::<usize>() {
                config.ranking.embedding_max_chars = Some(v).filter(|v| *v > 0);
            }
        }
        if let Ok(val) = std::env::var("CODE_CONTEXT_EMBED_CONCURRENCY") {
            if let Ok(v) = val.parse::<usize>() {
                config.ranking.embedding_concurrency = v.max(1);
            }
        }

        config
    }
}
