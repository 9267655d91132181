use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, HybridWeights, RankingConfig, DEFAULT_MAX_FILES};
use crate::error::{RelevanceError, Result};
use crate::llm::embeddings::{new_embedding_provider, truncate_for_embedding, EmbeddingAdapter};
use crate::models::{EmbeddingOptions, ScoredFile};
use crate::search::keywords::extract_keywords;
use crate::search::lexical::{score_file, score_lines};
use crate::search::path::query_path_relevance_score;
use crate::search::read_lines;
use crate::search::vector::cosine_similarity;

/// Why a file's embedding component contributes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradeReason {
    /// The embedding client could not be constructed
    NoBackend,
    /// The query itself could not be embedded
    QueryEmbeddingFailed,
    /// This file's embedding request failed
    FileEmbeddingFailed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmbeddingSignal {
    Scored(f64),
    Degraded(DegradeReason),
}

impl EmbeddingSignal {
    pub fn value(&self) -> f64 {
        match self {
            EmbeddingSignal::Scored(v) => *v,
            EmbeddingSignal::Degraded(_) => 0.0,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, EmbeddingSignal::Degraded(_))
    }
}

/// The three hybrid signals for one file, before weighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentScores {
    pub embedding: EmbeddingSignal,
    /// Lexical score already divided by the normaliser
    pub keyword: f64,
    pub path: f64,
}

impl ComponentScores {
    pub fn combine(&self, weights: &HybridWeights) -> f64 {
        weights.embedding * self.embedding.value()
            + weights.keyword * self.keyword
            + weights.path * self.path
    }
}

/// A hybrid result with its score breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedFile {
    pub path: String,
    pub components: ComponentScores,
    pub score: f64,
}

impl From<RankedFile> for ScoredFile {
    fn from(f: RankedFile) -> Self {
        ScoredFile {
            path: f.path,
            score: f.score,
        }
    }
}

/// Per-run count of candidates that did not get a full score.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipSummary {
    pub too_large: usize,
    pub unreadable: usize,
    pub embedding_failed: usize,
    /// Hybrid only: scored, but without an embedding component
    pub degraded: usize,
}

impl SkipSummary {
    pub fn skipped(&self) -> usize {
        self.too_large + self.unreadable + self.embedding_failed
    }

    fn record<T>(&mut self, outcome: &Outcome<T>) {
        match outcome {
            Outcome::Skipped(SkipReason::TooLarge) => self.too_large += 1,
            Outcome::Skipped(SkipReason::Unreadable) => self.unreadable += 1,
            Outcome::Skipped(SkipReason::EmbeddingFailed) => self.embedding_failed += 1,
            Outcome::Kept(_) | Outcome::Dropped => {}
        }
    }

    fn log(&self, strategy: &str, candidates: usize, kept: usize) {
        if self.skipped() > 0 || self.degraded > 0 {
            tracing::warn!(
                "{strategy}: {kept}/{candidates} files kept; skipped {} (too large: {}, unreadable: {}, embedding failed: {}); degraded: {}",
                self.skipped(),
                self.too_large,
                self.unreadable,
                self.embedding_failed,
                self.degraded
            );
        } else {
            tracing::info!("{strategy}: {kept}/{candidates} files kept");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    TooLarge,
    Unreadable,
    EmbeddingFailed,
}

#[derive(Debug)]
enum Outcome<T> {
    Kept(T),
    /// Scored, but not above zero
    Dropped,
    Skipped(SkipReason),
}

/// Sort descending by score and keep the top `max_files`.
///
/// The sort is stable, so tied files stay in candidate order.
pub fn rank_and_truncate<T, F>(mut files: Vec<T>, max_files: usize, score: F) -> Vec<T>
where
    F: Fn(&T) -> f64,
{
    files.sort_by(|a, b| {
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    files.truncate(max_files);
    files
}

/// `max_files`, or the configured default when it is 0.
fn effective_max(max_files: usize, ranking: &RankingConfig) -> usize {
    match (max_files, ranking.max_files) {
        (0, 0) => DEFAULT_MAX_FILES,
        (0, configured) => configured,
        (n, _) => n,
    }
}

/// Apply option defaults, taking an unset `max_files` from `ranking`.
fn resolve_options(opts: &EmbeddingOptions, ranking: &RankingConfig) -> EmbeddingOptions {
    let mut opts = opts.clone();
    opts.max_files = effective_max(opts.max_files, ranking);
    opts.with_defaults()
}

/// Embed `text`, giving up as soon as `cancel` fires.
async fn embed_cancellable(
    backend: &dyn EmbeddingAdapter,
    text: &str,
    cancel: &CancellationToken,
) -> Result<Vec<f32>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RelevanceError::Cancelled),
        res = backend.generate_embedding(text) => res,
    }
}

fn join_lines(lines: &[String]) -> String {
    let mut content = String::new();
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }
    content
}

/// Stat `full_path` and reject it if it is over `max_bytes`.
async fn check_size(rel: &str, full_path: &Path, max_bytes: u64) -> Option<SkipReason> {
    match tokio::fs::metadata(full_path).await {
        Ok(meta) if meta.len() > max_bytes => {
            tracing::warn!("Skipping large file {rel} ({} bytes)", meta.len());
            Some(SkipReason::TooLarge)
        }
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("Error getting file info for {rel}: {e}");
            Some(SkipReason::Unreadable)
        }
    }
}

// ─── Keyword-only ────────────────────────────────────────

/// Rank candidates by lexical keyword matches only, with default limits.
///
/// Fails with [`RelevanceError::NoKeywords`] if the query has no usable
/// keywords. Unreadable files are logged and skipped.
pub fn identify_relevant_files(
    query: &str,
    root: &Path,
    candidates: &[String],
    max_files: usize,
) -> Result<Vec<ScoredFile>> {
    identify_relevant_files_with_config(
        query,
        root,
        candidates,
        max_files,
        &RankingConfig::default(),
    )
}

/// Keyword-only ranking honouring the line cap, size limit and default
/// result count in `ranking`.
pub fn identify_relevant_files_with_config(
    query: &str,
    root: &Path,
    candidates: &[String],
    max_files: usize,
    ranking: &RankingConfig,
) -> Result<Vec<ScoredFile>> {
    let keywords = extract_keywords(query);
    if keywords.is_empty() {
        return Err(RelevanceError::NoKeywords);
    }

    let mut summary = SkipSummary::default();
    let mut scored = Vec::new();

    for rel in candidates {
        let full_path = root.join(rel);
        match std::fs::metadata(&full_path) {
            Ok(meta) if meta.len() > ranking.lexical_max_file_bytes => {
                tracing::warn!("Skipping large file {rel} ({} bytes)", meta.len());
                summary.too_large += 1;
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Error getting file info for {rel}: {e}");
                summary.unreadable += 1;
                continue;
            }
        }

        match score_file(&full_path, &keywords, ranking.lexical_line_cap) {
            Ok(score) if score > 0.0 => scored.push(ScoredFile {
                path: rel.clone(),
                score,
            }),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Error scoring file {rel}: {e}");
                summary.unreadable += 1;
            }
        }
    }

    let ranked = rank_and_truncate(scored, effective_max(max_files, ranking), |f| f.score);
    summary.log("keyword", candidates.len(), ranked.len());
    Ok(ranked)
}

// ─── Embedding-only ──────────────────────────────────────

/// Rank candidates by cosine similarity between query and file embeddings.
///
/// Building the client and embedding the query are fatal; per-file
/// failures skip that file.
pub async fn identify_relevant_files_with_embeddings(
    opts: &EmbeddingOptions,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<Vec<ScoredFile>> {
    let opts = resolve_options(opts, &config.ranking);
    let backend = new_embedding_provider(&opts, &config.backoff)?;
    rank_with_embeddings(&*backend, &opts, &config.ranking, cancel).await
}

/// Embedding-only ranking against an already-built backend.
pub async fn rank_with_embeddings(
    backend: &dyn EmbeddingAdapter,
    opts: &EmbeddingOptions,
    ranking: &RankingConfig,
    cancel: &CancellationToken,
) -> Result<Vec<ScoredFile>> {
    let query_embedding = embed_cancellable(backend, &opts.query, cancel).await?;

    let outcomes: Vec<Outcome<ScoredFile>> = stream::iter(&opts.candidate_files)
        .map(|rel| {
            embed_candidate(
                backend,
                &opts.target_path,
                rel,
                &query_embedding,
                ranking,
                cancel,
            )
        })
        .buffered(ranking.embedding_concurrency.max(1))
        .try_collect()
        .await?;

    let mut summary = SkipSummary::default();
    let mut scored = Vec::new();
    for outcome in outcomes {
        summary.record(&outcome);
        if let Outcome::Kept(file) = outcome {
            scored.push(file);
        }
    }

    let ranked = rank_and_truncate(scored, effective_max(opts.max_files, ranking), |f| f.score);
    summary.log("embedding", opts.candidate_files.len(), ranked.len());
    Ok(ranked)
}

async fn embed_candidate(
    backend: &dyn EmbeddingAdapter,
    root: &Path,
    rel: &str,
    query_embedding: &[f32],
    ranking: &RankingConfig,
    cancel: &CancellationToken,
) -> Result<Outcome<ScoredFile>> {
    if cancel.is_cancelled() {
        return Err(RelevanceError::Cancelled);
    }

    let full_path = root.join(rel);
    if let Some(reason) = check_size(rel, &full_path, ranking.embedding_max_file_bytes).await {
        return Ok(Outcome::Skipped(reason));
    }

    let lines = match read_lines(&full_path, ranking.embedding_line_cap).await {
        Ok(lines) => lines,
        Err(e) => {
            tracing::warn!("Error reading file {rel}: {e}");
            return Ok(Outcome::Skipped(SkipReason::Unreadable));
        }
    };

    let content = join_lines(&lines);
    let input = truncate_for_embedding(&content, ranking.embedding_max_chars);
    let file_embedding = match embed_cancellable(backend, input, cancel).await {
        Ok(v) => v,
        Err(RelevanceError::Cancelled) => return Err(RelevanceError::Cancelled),
        Err(e) => {
            tracing::warn!("Error getting embedding for {rel}: {e}");
            return Ok(Outcome::Skipped(SkipReason::EmbeddingFailed));
        }
    };

    let score = cosine_similarity(query_embedding, &file_embedding);
    if score > 0.0 {
        Ok(Outcome::Kept(ScoredFile {
            path: rel.to_string(),
            score,
        }))
    } else {
        Ok(Outcome::Dropped)
    }
}

// ─── Hybrid ──────────────────────────────────────────────

/// Rank candidates by `0.7·embedding + 0.2·keyword + 0.1·path` (default
/// weights).
///
/// A missing backend or a failed query embedding never aborts the run: the
/// embedding component drops to zero and keyword and path scores still rank
/// the files.
pub async fn identify_relevant_files_with_hybrid_approach(
    opts: &EmbeddingOptions,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<Vec<ScoredFile>> {
    let opts = resolve_options(opts, &config.ranking);
    let backend = match new_embedding_provider(&opts, &config.backoff) {
        Ok(backend) => Some(backend),
        Err(e) => {
            tracing::warn!(
                "Failed to create embedding provider for hybrid search: {e}. Proceeding with keyword and path relevance only."
            );
            None
        }
    };

    let ranked = rank_hybrid(backend.as_deref(), &opts, &config.ranking, cancel).await?;
    Ok(ranked.into_iter().map(ScoredFile::from).collect())
}

/// Hybrid ranking against an optional, already-built backend.
pub async fn rank_hybrid(
    backend: Option<&dyn EmbeddingAdapter>,
    opts: &EmbeddingOptions,
    ranking: &RankingConfig,
    cancel: &CancellationToken,
) -> Result<Vec<RankedFile>> {
    let query_embedding: Result<Vec<f32>, DegradeReason> = match backend {
        Some(b) => match embed_cancellable(b, &opts.query, cancel).await {
            Ok(v) => {
                tracing::info!("Generated query embedding for hybrid search");
                Ok(v)
            }
            Err(RelevanceError::Cancelled) => return Err(RelevanceError::Cancelled),
            Err(e) => {
                tracing::warn!(
                    "Failed to get query embedding for hybrid search: {e}. Proceeding without embedding scores."
                );
                Err(DegradeReason::QueryEmbeddingFailed)
            }
        },
        None => Err(DegradeReason::NoBackend),
    };

    let keywords = extract_keywords(&opts.query);
    tracing::info!("Keywords extracted from query: {keywords:?}");

    let ctx = HybridContext {
        backend,
        query_embedding: &query_embedding,
        keywords: &keywords,
        opts,
        ranking,
        cancel,
    };

    let outcomes: Vec<Outcome<RankedFile>> = stream::iter(&opts.candidate_files)
        .map(|rel| ctx.score_candidate(rel))
        .buffered(ranking.embedding_concurrency.max(1))
        .try_collect()
        .await?;

    let mut summary = SkipSummary::default();
    let mut scored = Vec::new();
    for outcome in outcomes {
        summary.record(&outcome);
        if let Outcome::Kept(file) = outcome {
            if file.components.embedding.is_degraded() {
                summary.degraded += 1;
            }
            scored.push(file);
        }
    }

    let ranked = rank_and_truncate(scored, effective_max(opts.max_files, ranking), |f| f.score);
    summary.log("hybrid", opts.candidate_files.len(), ranked.len());
    Ok(ranked)
}

struct HybridContext<'a> {
    backend: Option<&'a dyn EmbeddingAdapter>,
    query_embedding: &'a Result<Vec<f32>, DegradeReason>,
    keywords: &'a [String],
    opts: &'a EmbeddingOptions,
    ranking: &'a RankingConfig,
    cancel: &'a CancellationToken,
}

impl HybridContext<'_> {
    async fn score_candidate(&self, rel: &str) -> Result<Outcome<RankedFile>> {
        if self.cancel.is_cancelled() {
            return Err(RelevanceError::Cancelled);
        }

        let full_path = self.opts.target_path.join(rel);
        if let Some(reason) =
            check_size(rel, &full_path, self.ranking.hybrid_max_file_bytes).await
        {
            return Ok(Outcome::Skipped(reason));
        }

        // One read serves both the embedding input and the lexical scan.
        let read_cap = self
            .ranking
            .lexical_line_cap
            .max(self.ranking.hybrid_line_cap);
        let lines = match read_lines(&full_path, read_cap).await {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!("Error reading file {rel}: {e}");
                return Ok(Outcome::Skipped(SkipReason::Unreadable));
            }
        };

        let embedding = self.embedding_signal(rel, &lines).await?;
        let raw_keyword = score_lines(&lines, self.keywords, self.ranking.lexical_line_cap);
        let components = ComponentScores {
            embedding,
            keyword: raw_keyword / self.ranking.keyword_normalizer,
            path: query_path_relevance_score(rel, &self.opts.query),
        };
        let score = components.combine(&self.ranking.weights);

        tracing::debug!(
            "File: {rel}, Embedding: {:.2}, Keyword: {:.2}, Path: {:.2}, Combined: {:.2}",
            components.embedding.value(),
            components.keyword,
            components.path,
            score
        );

        if score > 0.0 {
            Ok(Outcome::Kept(RankedFile {
                path: rel.to_string(),
                components,
                score,
            }))
        } else {
            Ok(Outcome::Dropped)
        }
    }

    async fn embedding_signal(&self, rel: &str, lines: &[String]) -> Result<EmbeddingSignal> {
        let (backend, query_embedding) = match (self.backend, self.query_embedding) {
            (_, Err(reason)) => return Ok(EmbeddingSignal::Degraded(*reason)),
            (None, Ok(_)) => return Ok(EmbeddingSignal::Degraded(DegradeReason::NoBackend)),
            (Some(b), Ok(q)) => (b, q),
        };

        let cap = self.ranking.hybrid_line_cap.min(lines.len());
        let content = join_lines(&lines[..cap]);
        let input = truncate_for_embedding(&content, self.ranking.embedding_max_chars);
        match embed_cancellable(backend, input, self.cancel).await {
            Ok(v) => Ok(EmbeddingSignal::Scored(cosine_similarity(query_embedding, &v))),
            Err(RelevanceError::Cancelled) => Err(RelevanceError::Cancelled),
            Err(e) => {
                tracing::warn!("Error getting embedding for file {rel}: {e}");
                Ok(EmbeddingSignal::Degraded(DegradeReason::FileEmbeddingFailed))
            }
        }
    }
}
