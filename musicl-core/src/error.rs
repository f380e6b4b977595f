//! Error types for musicl-core.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reading, writing or validating `~/.musicl/config.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode config as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The source error carries serde_yaml's line and column.
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("cannot determine home directory; set $HOME")]
    HomeNotFound,

    #[error("config not found at {}; run `musicl init` first", path.display())]
    ConfigNotFound { path: PathBuf },

    /// The file parsed but describes an unusable setup.
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
