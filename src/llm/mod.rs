//! Embedding backends: one capability trait, a closed set of providers.

pub mod backoff;
pub mod embeddings;
pub mod gemini;

pub use embeddings::{new_embedding_provider, EmbeddingAdapter, Provider};
