//! Relevance scoring: keyword extraction, lexical and path scorers, cosine
//! similarity and the ranking strategies that combine them.

pub mod hybrid;
pub mod keywords;
pub mod lexical;
pub mod path;
pub mod vector;

use std::path::Path;
use tokio::io::AsyncBufReadExt;

use crate::error::{RelevanceError, Result};

pub use hybrid::{
    identify_relevant_files, identify_relevant_files_with_config,
    identify_relevant_files_with_embeddings, identify_relevant_files_with_hybrid_approach,
};

/// Read at most `max_lines` lines from `path`, without line terminators.
/// Invalid UTF-8 is replaced rather than rejected.
pub async fn read_lines(path: &Path, max_lines: usize) -> Result<Vec<String>> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| RelevanceError::file_access(path, e))?;
    let mut reader = tokio::io::BufReader::new(file);
    let mut lines = Vec::new();
    let mut buf = Vec::new();

    while lines.len() < max_lines {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| RelevanceError::file_access(path, e))?;
        if n == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        lines.push(line.trim_end_matches(|c| c == '\n' || c == '\r').to_string());
    }

    Ok(lines)
}
