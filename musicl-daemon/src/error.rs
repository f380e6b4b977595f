use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to watch config directory: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Config(#[from] musicl_core::ConfigError),

    #[error(transparent)]
    Sync(#[from] musicl_sync::SyncError),

    #[error("malformed daemon message: {0}")]
    Json(#[from] serde_json::Error),

    /// The daemon answered `ok: false`, or hung up mid-exchange.
    #[error("daemon refused request: {0}")]
    Protocol(String),

    #[error("no daemon listening on {}", socket.display())]
    DaemonNotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    let path = path.into();
    DaemonError::Io { path, source }
}
