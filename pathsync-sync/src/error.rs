//! Error types for pathsync-sync.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use pathsync_core::{CoreError, RelPath};

use crate::transport::TransportError;

/// Which view a scan was reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSide {
    Local,
    Remote,
}

impl fmt::Display for ScanSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanSide::Local => write!(f, "local"),
            ScanSide::Remote => write!(f, "remote"),
        }
    }
}

/// All errors that can arise from a sync run.
///
/// Scan errors abort a run before anything is mutated. Transfer and delete
/// errors are reported per path and never abort sibling actions.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local tree or the remote listing could not be read.
    #[error("{side} scan unavailable: {reason}")]
    ScanUnavailable { side: ScanSide, reason: String },

    /// The remote fingerprint after upload does not match what was sent.
    #[error("upload of {path} did not verify: sent {expected}, remote has {actual}")]
    UploadVerificationFailed {
        path: RelPath,
        expected: String,
        actual: String,
    },

    /// The downloaded bytes do not hash to the remote fingerprint.
    #[error("download of {path} did not verify: expected {expected}, received {actual}")]
    DownloadVerificationFailed {
        path: RelPath,
        expected: String,
        actual: String,
    },

    /// A local or remote delete failed; the path is left as it was.
    #[error("could not delete {path}: {reason}")]
    DeleteFailed { path: RelPath, reason: String },

    /// An error from the remote transport outside of the cases above.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An error from manifest or config persistence.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
