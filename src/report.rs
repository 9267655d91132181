use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::models::{ScoredFile, Strategy};
use crate::search::keywords::{extract_query_keyword, FALLBACK_KEYWORD};
use crate::walk::Candidates;

/// Lines of each relevant file quoted in the report.
pub const EXCERPT_LINES: usize = 20;

const FALLBACK_BASE_NAME: &str = "project";

#[derive(Debug, Clone, Serialize)]
pub struct ReportFile {
    pub rank: usize,
    pub path: String,
    pub score: f64,
    pub excerpt: String,
}

/// One ranking run, ready to render.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub query: String,
    pub target: String,
    pub strategy: Strategy,
    /// Set when the requested strategy failed and keyword-only ran instead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_from: Option<Strategy>,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<String>,
    pub files: Vec<ReportFile>,
}

pub struct ReportInput<'a> {
    pub query: &'a str,
    pub target: &'a Path,
    pub strategy: Strategy,
    pub fallback_from: Option<Strategy>,
    pub ranked: &'a [ScoredFile],
    /// Walk result; the tree is only built when this is set
    pub tree_from: Option<&'a Candidates>,
}

impl Report {
    /// Read excerpts for every ranked file and assemble the report.
    pub fn build(input: ReportInput<'_>, generated_at: DateTime<Utc>) -> Self {
        let files = input
            .ranked
            .iter()
            .enumerate()
            .map(|(i, f)| ReportFile {
                rank: i + 1,
                path: f.path.clone(),
                score: f.score,
                excerpt: read_excerpt(&input.target.join(&f.path), EXCERPT_LINES),
            })
            .collect();

        let tree = input.tree_from.map(|c| {
            let relevant: HashSet<&str> = input.ranked.iter().map(|f| f.path.as_str()).collect();
            generate_tree(&root_name(input.target), &c.files, &c.dirs, &relevant)
        });

        Self {
            query: input.query.to_string(),
            target: input.target.display().to_string(),
            strategy: input.strategy,
            fallback_from: input.fallback_from,
            generated_at,
            tree,
            files,
        }
    }
}

fn read_excerpt(path: &Path, max_lines: usize) -> String {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("Cannot read excerpt from {}: {e}", path.display());
            return String::new();
        }
    };
    let mut reader = BufReader::new(file);
    let mut excerpt = String::new();
    let mut buf = Vec::new();
    for _ in 0..max_lines {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => excerpt.push_str(&String::from_utf8_lossy(&buf)),
            Err(e) => {
                tracing::warn!("Error reading excerpt from {}: {e}", path.display());
                break;
            }
        }
    }
    excerpt
}

fn root_name(target: &Path) -> String {
    target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .or_else(|| {
            target
                .canonicalize()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        })
        .unwrap_or_else(|| FALLBACK_BASE_NAME.to_string())
}

// ─── Markdown ────────────────────────────────────────────

pub fn render_markdown(report: &Report) -> String {
    let mut out = String::new();

    out.push_str("# Code Context Summary\n\n");
    let _ = writeln!(out, "**Query:** {}\n", report.query);
    let _ = writeln!(out, "**Target Directory:** {}\n", report.target);
    match report.fallback_from {
        Some(from) => {
            let _ = writeln!(
                out,
                "**Strategy:** {} (fell back from {})\n",
                strategy_name(report.strategy),
                strategy_name(from)
            );
        }
        None => {
            let _ = writeln!(out, "**Strategy:** {}\n", strategy_name(report.strategy));
        }
    }
    let _ = writeln!(
        out,
        "**Generated on:** {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if let Some(tree) = &report.tree {
        out.push_str("## Directory Structure\n\n");
        let fence = fence_for(tree);
        let _ = writeln!(out, "{fence}text\n{tree}{fence}\n");
        out.push_str("(* Indicates files included in the summaries below)\n\n");
    }

    out.push_str("## Relevant Files\n\n");
    let _ = writeln!(
        out,
        "Found {} relevant files for the query.\n",
        report.files.len()
    );

    if !report.files.is_empty() {
        out.push_str("| Rank | File | Score |\n|---:|---|---:|\n");
        for f in &report.files {
            let _ = writeln!(out, "| {} | `{}` | {:.4} |", f.rank, f.path, f.score);
        }
        out.push('\n');

        out.push_str("## File Summaries\n\n");
        for f in &report.files {
            let _ = writeln!(out, "### `{}`\n", f.path);
            let lang = Path::new(&f.path)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let fence = fence_for(&f.excerpt);
            let _ = writeln!(out, "{fence}{lang}");
            out.push_str(&f.excerpt);
            if !f.excerpt.is_empty() && !f.excerpt.ends_with('\n') {
                out.push('\n');
            }
            let _ = write!(out, "{fence}\n\n---\n\n");
        }
    }

    out
}

/// A backtick fence longer than any backtick run inside `content`, and at
/// least three long.
fn fence_for(content: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in content.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}

pub fn render_json(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize report")
}

fn strategy_name(s: Strategy) -> &'static str {
    match s {
        Strategy::Keyword => "keyword",
        Strategy::Embedding => "embedding",
        Strategy::Hybrid => "hybrid",
    }
}

/// Write `content` to `path`, creating parent directories as needed.
pub fn write_report(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

// ─── Tree ────────────────────────────────────────────────

#[derive(Default)]
struct TreeNode {
    is_dir: bool,
    relevant: bool,
    children: BTreeMap<String, TreeNode>,
}

impl TreeNode {
    fn insert(&mut self, rel: &str, is_dir: bool, relevant: bool) {
        let parts: Vec<&str> = rel.split('/').filter(|p| !p.is_empty()).collect();
        let mut node = self;
        for (i, part) in parts.iter().enumerate() {
            let last = i + 1 == parts.len();
            node = node.children.entry(part.to_string()).or_default();
            if !last {
                node.is_dir = true;
            } else {
                node.is_dir |= is_dir;
                node.relevant |= relevant;
            }
        }
    }

    fn render(&self, prefix: &str, out: &mut String) {
        let mut children: Vec<(&String, &TreeNode)> = self.children.iter().collect();
        // directories first, then by name
        children.sort_by(|a, b| b.1.is_dir.cmp(&a.1.is_dir).then_with(|| a.0.cmp(b.0)));

        let count = children.len();
        for (i, (name, child)) in children.into_iter().enumerate() {
            let is_last = i + 1 == count;
            out.push_str(prefix);
            out.push_str(if is_last { "└── " } else { "├── " });
            out.push_str(name);
            if child.is_dir {
                out.push('/');
            } else if child.relevant {
                out.push_str(" (*)");
            }
            out.push('\n');

            let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
            child.render(&child_prefix, out);
        }
    }
}

/// Render the walked tree, marking files in `relevant` with `(*)`.
pub fn generate_tree(
    root_name: &str,
    files: &[String],
    dirs: &[String],
    relevant: &HashSet<&str>,
) -> String {
    let mut root = TreeNode {
        is_dir: true,
        ..Default::default()
    };
    for dir in dirs {
        root.insert(dir, true, false);
    }
    for file in files {
        root.insert(file, false, relevant.contains(file.as_str()));
    }

    let mut out = format!("{root_name}/\n");
    root.render("", &mut out);
    out
}

// ─── Output naming ───────────────────────────────────────

fn clean_file_component(s: &str) -> String {
    s.replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect()
}

/// `<base>_<keyword>_summary.md`, where base is the target directory name
/// and keyword the longest query keyword, both restricted to filename-safe
/// characters.
pub fn default_output_name(target: &Path, query: &str) -> String {
    let mut base = clean_file_component(&root_name(target));
    if base.is_empty() || base == "." || base == ".." {
        base = FALLBACK_BASE_NAME.to_string();
    }

    let mut keyword = clean_file_component(&extract_query_keyword(query));
    if keyword.is_empty() {
        keyword = FALLBACK_KEYWORD.to_string();
    }

    format!("{base}_{keyword}_summary.md")
}
