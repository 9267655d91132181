//! Integration tests for the code-context ranking pipeline.
//!
//! These tests walk real fixture trees on disk and run the strategies end to
//! end. Embedding backends are replaced by in-process fakes so no model
//! server is needed.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use code_context::config::{Config, RankingConfig};
use code_context::error::{RelevanceError, Result};
use code_context::llm::EmbeddingAdapter;
use code_context::models::EmbeddingOptions;
use code_context::report::generate_tree;
use code_context::search::hybrid::{rank_hybrid, rank_with_embeddings};
use code_context::search::identify_relevant_files;
use code_context::walk::collect_candidates;

/// Helper: write a small Go service to disk.
fn sample_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let files: &[(&str, &str)] = &[
        (
            "config/parser.go",
            "package config\n\n// ParseJSON parses a JSON config file.\nfunc ParseJSON(path string) (*Config, error) {\n\treturn nil, nil\n}\n",
        ),
        (
            "config/loader_test.go",
            "package config\n\nimport \"testing\"\n\nfunc TestLoad(t *testing.T) {}\n",
        ),
        ("README.md", "# Service\n\nA small HTTP service.\n"),
        (
            "server/http.go",
            "package server\n\n// Serve starts the HTTP listener.\nfunc Serve() {}\n",
        ),
        ("node_modules/pkg/config.js", "module.exports = { parse: 1 }\n"),
        (".git/config", "[core]\n"),
    ];
    for (rel, content) in files {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    dir
}

/// Vector of counts for a fixed vocabulary.
struct VocabEmbedder;

const VOCAB: [&str; 4] = ["parse", "json", "config", "http"];

#[async_trait]
impl EmbeddingAdapter for VocabEmbedder {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        Ok(VOCAB.iter().map(|w| lower.matches(w).count() as f32).collect())
    }
}

struct DownEmbedder;

#[async_trait]
impl EmbeddingAdapter for DownEmbedder {
    async fn generate_embedding(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RelevanceError::BackendUnavailable("connection refused".to_string()))
    }
}

fn options(root: &Path, query: &str, files: Vec<String>, max_files: usize) -> EmbeddingOptions {
    EmbeddingOptions {
        query: query.to_string(),
        target_path: root.to_path_buf(),
        candidate_files: files,
        max_files,
        ..Default::default()
    }
    .with_defaults()
}

#[test]
fn test_walker_feeds_keyword_ranking() {
    let dir = sample_project();
    let candidates = collect_candidates(dir.path()).unwrap();

    assert!(!candidates.files.iter().any(|f| f.starts_with("node_modules")));
    assert!(!candidates.files.iter().any(|f| f.starts_with(".git")));

    let ranked =
        identify_relevant_files("parse JSON config", dir.path(), &candidates.files, 10).unwrap();
    let paths: Vec<&str> = ranked.iter().map(|f| f.path.as_str()).collect();

    assert_eq!(paths[0], "config/parser.go");
    // README has no keyword hits at all
    assert!(!paths.contains(&"README.md"));
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn test_keyword_ranking_is_idempotent() {
    let dir = sample_project();
    let candidates = collect_candidates(dir.path()).unwrap();
    let first = identify_relevant_files("http server", dir.path(), &candidates.files, 10).unwrap();
    let second = identify_relevant_files("http server", dir.path(), &candidates.files, 10).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_keyword_ranking_respects_max_files() {
    let dir = sample_project();
    let candidates = collect_candidates(dir.path()).unwrap();
    let ranked = identify_relevant_files("package", dir.path(), &candidates.files, 2).unwrap();
    assert_eq!(ranked.len(), 2);
}

#[tokio::test]
async fn test_embedding_ranking_end_to_end() {
    let dir = sample_project();
    let candidates = collect_candidates(dir.path()).unwrap();
    let opts = options(dir.path(), "parse json config", candidates.files, 10);

    let ranked = rank_with_embeddings(
        &VocabEmbedder,
        &opts,
        &RankingConfig::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(ranked[0].path, "config/parser.go");
    assert!(ranked.iter().all(|f| f.score > 0.0 && f.score <= 1.0 + 1e-9));
}

#[tokio::test]
async fn test_hybrid_degrades_instead_of_failing() {
    let dir = sample_project();
    let candidates = collect_candidates(dir.path()).unwrap();
    let opts = options(dir.path(), "parse JSON config", candidates.files.clone(), 10);

    let degraded = rank_hybrid(
        Some(&DownEmbedder),
        &opts,
        &RankingConfig::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert!(!degraded.is_empty());
    assert_eq!(degraded[0].path, "config/parser.go");
    assert!(degraded.iter().all(|f| f.components.embedding.is_degraded()));

    let full = rank_hybrid(
        Some(&VocabEmbedder),
        &opts,
        &RankingConfig::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(full[0].path, "config/parser.go");
    // the embedding component only ever adds to the degraded score
    assert!(full[0].score > degraded[0].score);
}

#[tokio::test]
async fn test_hybrid_entry_point_with_unreachable_backend() {
    let dir = sample_project();
    let candidates = collect_candidates(dir.path()).unwrap();
    // nothing listens on port 9 of localhost
    let opts = EmbeddingOptions {
        endpoint: "http://127.0.0.1:9/api/embeddings".to_string(),
        ..options(dir.path(), "parse JSON config", candidates.files, 10)
    };

    let ranked = code_context::search::identify_relevant_files_with_hybrid_approach(
        &opts,
        &Config::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(ranked[0].path, "config/parser.go");

    let err = code_context::search::identify_relevant_files_with_embeddings(
        &opts,
        &Config::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(err.is_backend_failure());
}

#[test]
fn test_tree_marks_ranked_files() {
    let dir = sample_project();
    let candidates = collect_candidates(dir.path()).unwrap();
    let ranked =
        identify_relevant_files("parse JSON config", dir.path(), &candidates.files, 1).unwrap();
    let relevant: HashSet<&str> = ranked.iter().map(|f| f.path.as_str()).collect();

    let tree = generate_tree("svc", &candidates.files, &candidates.dirs, &relevant);
    assert!(tree.starts_with("svc/\n"));
    assert!(tree.contains("parser.go (*)"));
    assert!(!tree.contains("loader_test.go (*)"));
    assert!(!tree.contains("node_modules"));
}
