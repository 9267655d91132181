//! # code-context
//!
//! Ranks the files of a codebase by relevance to a natural-language query,
//! using lexical keyword matches, path heuristics and embedding similarity.
//!
//! ## Architecture
//!
//! ```text
//!        ┌─────────────┐      ┌──────────────────┐
//!        │  User Query  │      │ Candidate Files  │
//!        └──────┬───────┘      └────────┬─────────┘
//!               │                       │
//!               ▼                       │
//!      ┌─────────────────┐              │
//!      │ Keyword Extract │              │
//!      │ (stop words,    │              │
//!      │  ≥3 chars)      │              │
//!      └────────┬────────┘              │
//!               │                       │
//!               └───────────┬───────────┘
//!                           │ per file
//!        ┌──────────────────┼──────────────────┐
//!        ▼                  ▼                  ▼
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Lexical    │   │    Path      │   │  Embedding   │
//! │1/(0.1+n/100)│   │  heuristics  │   │   cosine     │
//! │ first 1000  │   │  (cap 1.0)   │   │ (may degrade)│
//! └──────┬──────┘   └──────┬───────┘   └──────┬───────┘
//!        │  ÷10            │                  │
//!        └─────────────────┼──────────────────┘
//!                          ▼
//!             ┌─────────────────────────┐
//!             │  0.2·kw + 0.1·path      │
//!             │     + 0.7·embedding     │
//!             │  drop ≤ 0, sort, top N  │
//!             └────────────┬────────────┘
//!                          ▼
//!             ┌─────────────────────────┐
//!             │   Ranked ScoredFiles    │
//!             └─────────────────────────┘
//! ```
//!
//! Keyword-only uses the lexical column alone; embedding-only uses the
//! embedding column alone and fails if the backend cannot embed the query.
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for the embedding backend and ranking limits
//! - [`error`] - `RelevanceError`, the library error taxonomy
//! - [`models`] - Shared data types: `ScoredFile`, `Strategy`, `EmbeddingOptions`
//! - [`search::keywords`] - Query tokenisation and stop-word filtering
//! - [`search::lexical`] - Position-weighted keyword scoring of file lines
//! - [`search::path`] - Path-name relevance heuristics
//! - [`search::vector`] - Cosine similarity
//! - [`search::hybrid`] - The three ranking strategies
//! - [`llm::embeddings`] - Embedding adapters for local Ollama-style and OpenAI-compatible backends
//! - [`llm::gemini`] - Gemini embedding adapter
//! - [`llm::backoff`] - Jittered exponential backoff for rate-limited backends
//! - [`walk`] - Candidate file discovery
//! - [`report`] - Markdown / JSON report rendering and the directory tree

pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod report;
pub mod search;
pub mod walk;
