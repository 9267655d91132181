use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the relevance pipeline.
///
/// Only `NoKeywords`, `UnknownProvider` and `Cancelled` are fatal by nature;
/// the rest describe a single file or backend call and the strategies decide
/// whether to skip, degrade or abort.
#[derive(Debug, Error)]
pub enum RelevanceError {
    /// The query produced no usable keywords.
    #[error("could not extract meaningful keywords from query")]
    NoKeywords,

    /// A candidate file could not be stat'ed, opened or read.
    #[error("cannot read {}: {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The provider identifier does not name a known backend.
    #[error("unknown embedding provider: {0}")]
    UnknownProvider(String),

    /// Transport failure, non-success status or undecodable body.
    #[error("embedding backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend kept signalling rate limits until the retry budget ran out.
    #[error("rate limit retries exhausted after {attempts} attempts: {source}")]
    RateLimitExhausted {
        attempts: u32,
        #[source]
        source: Box<RelevanceError>,
    },

    /// The run-scoped cancellation token fired.
    #[error("ranking run cancelled")]
    Cancelled,
}

impl RelevanceError {
    pub(crate) fn file_access(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileAccess {
            path: path.into(),
            source,
        }
    }

    /// True for errors that describe a backend call rather than local state.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(_) | Self::RateLimitExhausted { .. }
        )
    }
}

impl From<reqwest::Error> for RelevanceError {
    fn from(e: reqwest::Error) -> Self {
        Self::BackendUnavailable(e.to_string())
    }
}

pub type Result<T, E = RelevanceError> = std::result::Result<T, E>;
