//! Error types for rule loading and resolution.

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while reading or interpreting rule files.
///
/// These never reach the transport: the engine logs them and answers with
/// the 500 template instead.
#[derive(Debug, Error)]
pub enum MockError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid directive in {path}: {source}")]
    Directive {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid scenario file pattern: {0}")]
    Pattern(#[source] globset::Error),

    #[error("template interpolation produced invalid JSON: {0}")]
    Interpolation(#[source] serde_json::Error),
}

impl MockError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MockError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MockError>;
