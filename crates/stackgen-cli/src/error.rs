//! CLI errors

use std::path::PathBuf;

use stackgen_config::ConfigError;
use stackgen_generate::GenerateError;

/// Result with the CLI [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{failed} of {total} apps failed")]
    AppsFailed { failed: usize, total: usize },
}

impl Error {
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Write {
            path: path.into(),
            source,
        }
    }
}
