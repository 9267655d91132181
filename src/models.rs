use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::{
    EmbeddingConfig, DEFAULT_EMBEDDING_MODEL, DEFAULT_LOCAL_ENDPOINT, DEFAULT_MAX_FILES,
    DEFAULT_PROVIDER,
};

/// A ranked candidate. Lists of these are ordered by descending score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFile {
    pub path: String,
    pub score: f64,
}

/// Which ranking pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Keyword,
    Embedding,
    Hybrid,
}

/// Everything one embedding-backed ranking call needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingOptions {
    /// Provider identifier, see [`crate::llm::embeddings::Provider`]
    pub provider: String,
    pub model: String,
    /// Endpoint URL for HTTP-based providers
    pub endpoint: String,
    /// Credential for managed providers
    #[serde(skip_serializing)]
    pub api_key: String,
    pub query: String,
    /// Root that candidate paths are relative to
    pub target_path: PathBuf,
    pub candidate_files: Vec<String>,
    /// Result cap; 0 means the default
    pub max_files: usize,
}

impl EmbeddingOptions {
    pub fn from_config(
        config: &EmbeddingConfig,
        query: &str,
        target_path: PathBuf,
        candidate_files: Vec<String>,
        max_files: usize,
    ) -> Self {
        Self {
            provider: config.provider.clone(),
            model: config.model.clone(),
            endpoint: config.endpoint.clone().unwrap_or_default(),
            api_key: config.api_key.clone().unwrap_or_default(),
            query: query.to_string(),
            target_path,
            candidate_files,
            max_files,
        }
    }

    /// Fill every unset field. The default endpoint only applies to local
    /// providers so a managed provider never gets pointed at Ollama.
    pub fn with_defaults(mut self) -> Self {
        if self.max_files == 0 {
            self.max_files = DEFAULT_MAX_FILES;
        }
        if self.provider.trim().is_empty() {
            self.provider = DEFAULT_PROVIDER.to_string();
        }
        if self.model.trim().is_empty() {
            self.model = DEFAULT_EMBEDDING_MODEL.to_string();
        }
        if self.endpoint.is_empty() && is_local_provider(&self.provider) {
            self.endpoint = DEFAULT_LOCAL_ENDPOINT.to_string();
        }
        self
    }
}

fn is_local_provider(provider: &str) -> bool {
    matches!(
        provider.to_lowercase().as_str(),
        "local-http" | "ollama" | "local"
    )
}
