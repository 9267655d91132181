use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use code_context::config::Config;
use code_context::error::RelevanceError;
use code_context::models::{EmbeddingOptions, ScoredFile, Strategy};
use code_context::report::{self, Report, ReportInput};
use code_context::search::{
    identify_relevant_files_with_config, identify_relevant_files_with_embeddings,
    identify_relevant_files_with_hybrid_approach,
};
use code_context::walk::{self, Candidates};

#[derive(Parser, Debug)]
#[command(
    name = "code-context",
    version,
    about = "Rank the files of a codebase by relevance to a query"
)]
struct Cli {
    /// Directory to search
    target_path: PathBuf,

    /// Natural-language query
    query: String,

    #[arg(long, value_enum, default_value_t = StrategyArg::Hybrid)]
    strategy: StrategyArg,

    /// local-http (alias ollama), gemini or openai
    #[arg(long)]
    embedding_provider: Option<String>,

    #[arg(long)]
    embedding_model: Option<String>,

    #[arg(long)]
    embedding_endpoint: Option<String>,

    /// API key for managed embedding providers
    #[arg(long)]
    api_key: Option<String>,

    /// Maximum number of files to report
    #[arg(long)]
    max_files: Option<usize>,

    /// Include the directory tree in the report
    #[arg(long)]
    show_tree: bool,

    #[arg(long, value_enum, default_value_t = Format::Markdown)]
    format: Format,

    /// Output file, or `-` for stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Keyword,
    Embedding,
    Hybrid,
}

impl From<StrategyArg> for Strategy {
    fn from(s: StrategyArg) -> Self {
        match s {
            StrategyArg::Keyword => Strategy::Keyword,
            StrategyArg::Embedding => Strategy::Embedding,
            StrategyArg::Hybrid => Strategy::Hybrid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout may carry the report, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = apply_cli(Config::from_env(), &cli);
    tracing::info!(
        "Embedding provider: {} ({})",
        config.embedding.provider,
        config.embedding.model
    );

    let candidates = walk::collect_candidates(&cli.target_path)
        .with_context(|| format!("Failed to walk {}", cli.target_path.display()))?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling ranking run");
                cancel.cancel();
            }
        });
    }

    let requested: Strategy = cli.strategy.into();
    let (strategy, fallback_from, ranked) =
        rank(requested, &cli, &config, &candidates, &cancel).await?;

    let report = Report::build(
        ReportInput {
            query: &cli.query,
            target: &cli.target_path,
            strategy,
            fallback_from,
            ranked: &ranked,
            tree_from: cli.show_tree.then_some(&candidates),
        },
        chrono::Utc::now(),
    );

    let rendered = match cli.format {
        Format::Markdown => report::render_markdown(&report),
        Format::Json => report::render_json(&report)?,
    };

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.target_path, &cli.query, cli.format));

    if output.as_os_str() == "-" {
        print!("{rendered}");
    } else {
        report::write_report(&output, &rendered)?;
        tracing::info!(
            "Wrote {} relevant files to {}",
            ranked.len(),
            output.display()
        );
    }

    Ok(())
}

fn apply_cli(mut config: Config, cli: &Cli) -> Config {
    if let Some(provider) = &cli.embedding_provider {
        config.embedding.provider = provider.clone();
    }
    if let Some(model) = &cli.embedding_model {
        config.embedding.model = model.clone();
    }
    if let Some(endpoint) = &cli.embedding_endpoint {
        config.embedding.endpoint = Some(endpoint.clone());
    }
    if let Some(key) = &cli.api_key {
        config.embedding.api_key = Some(key.clone());
    }
    if let Some(max) = cli.max_files {
        config.ranking.max_files = max;
    }
    config
}

fn default_output_path(target: &Path, query: &str, format: Format) -> PathBuf {
    let name = PathBuf::from(report::default_output_name(target, query));
    match format {
        Format::Markdown => name,
        Format::Json => name.with_extension("json"),
    }
}

/// Run the requested strategy, falling back to keyword-only when an
/// embedding-backed run fails for any reason other than cancellation.
async fn rank(
    requested: Strategy,
    cli: &Cli,
    config: &Config,
    candidates: &Candidates,
    cancel: &CancellationToken,
) -> anyhow::Result<(Strategy, Option<Strategy>, Vec<ScoredFile>)> {
    let max_files = config.ranking.max_files;

    let result = match requested {
        Strategy::Keyword => {
            let ranked = rank_keyword(cli, candidates, config).await?;
            return Ok((Strategy::Keyword, None, ranked));
        }
        Strategy::Embedding | Strategy::Hybrid => {
            let opts = EmbeddingOptions::from_config(
                &config.embedding,
                &cli.query,
                cli.target_path.clone(),
                candidates.files.clone(),
                max_files,
            );
            if requested == Strategy::Embedding {
                identify_relevant_files_with_embeddings(&opts, config, cancel).await
            } else {
                identify_relevant_files_with_hybrid_approach(&opts, config, cancel).await
            }
        }
    };

    match result {
        Ok(ranked) => Ok((requested, None, ranked)),
        Err(RelevanceError::Cancelled) => bail!("Ranking cancelled"),
        Err(e) => {
            tracing::warn!("{requested:?} ranking failed: {e}. Falling back to keyword-only ranking");
            let ranked = rank_keyword(cli, candidates, config).await?;
            Ok((Strategy::Keyword, Some(requested), ranked))
        }
    }
}

async fn rank_keyword(
    cli: &Cli,
    candidates: &Candidates,
    config: &Config,
) -> anyhow::Result<Vec<ScoredFile>> {
    let query = cli.query.clone();
    let root = cli.target_path.clone();
    let files = candidates.files.clone();
    let ranking = config.ranking.clone();

    let ranked = tokio::task::spawn_blocking(move || {
        identify_relevant_files_with_config(&query, &root, &files, ranking.max_files, &ranking)
    })
    .await
    .context("Keyword ranking task failed")??;
    Ok(ranked)
}
