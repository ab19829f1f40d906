//! Error types for pathsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from manifest and config persistence.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted manifest exists but cannot be parsed.
    ///
    /// Never repaired automatically: the caller decides whether to start
    /// fresh or abort.
    #[error("manifest at {path} is corrupt: {source}")]
    ManifestCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// YAML parse error on config load - includes file path and line context.
    #[error("failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// JSON serialization error (manifest write path).
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error (config write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A path could not be expressed relative to the sync root.
    #[error("invalid relative path: {0}")]
    InvalidPath(String),
}

/// Convenience constructor for [`CoreError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
