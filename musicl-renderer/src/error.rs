use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// Template parse failure or a render-time error inside a template,
    /// including context building.
    #[error("playlist template failed: {0}")]
    Tera(#[from] tera::Error),

    #[error("cannot read template override {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A full-items playlist needs at least one episode; an empty one would
    /// be detected as pointer-only on the next pass.
    #[error("nothing to render: full-items playlist has no episodes")]
    NoEntries,
}
