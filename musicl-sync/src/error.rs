//! Error types for musicl-sync.

use std::path::PathBuf;

use thiserror::Error;

use musicl_renderer::RenderError;

/// Every way a single feed's pass can fail.
///
/// Nothing here is process-fatal: the pipeline and the scheduler turn each
/// error into a per-feed report.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Upstream unreachable, timed out or unparsable. Retryable.
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// Upstream parsed fine but carries no episodes.
    #[error("upstream feed {url} has no episodes")]
    EmptyFeed { url: String },

    /// Reconciliation produced nothing to write.
    #[error("playlist {playlist}: upstream produced no content; refusing to write")]
    NoContent { playlist: String },

    /// The store's version moved under us.
    #[error("version conflict on {path} after {attempts} attempt(s)")]
    VersionConflict { path: String, attempts: u32 },

    /// Auth, permission or addressing problem on the store.
    #[error("store access denied for {path}: {message}")]
    StoreAccess { path: String, message: String },

    /// Transient store failure (5xx, rate limit, transport). Retryable.
    #[error("store temporarily unavailable for {path}: {message}")]
    StoreUnavailable { path: String, message: String },

    #[error("no configured feed named '{0}'")]
    UnknownFeed(String),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Network-level failures worth another attempt after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Fetch { .. } | SyncError::StoreUnavailable { .. }
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::VersionConflict { .. })
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
