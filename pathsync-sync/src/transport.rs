//! Remote store interface.
//!
//! A [`RemoteTransport`] is bound to one already-authenticated remote
//! project. Every method is a blocking call and may be invoked from several
//! worker threads at once for disjoint paths.

use std::io::Read;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use pathsync_core::{PathRecord, RelPath};

/// Errors reported by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote project cannot be reached at all.
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// The requested remote path does not exist.
    #[error("remote path not found: {0}")]
    NotFound(RelPath),

    /// I/O failure on the remote side.
    #[error("remote I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The remote refused the request.
    #[error("remote rejected request: {0}")]
    Rejected(String),
}

pub(crate) fn remote_io(path: impl Into<PathBuf>, source: std::io::Error) -> TransportError {
    TransportError::Io {
        path: path.into(),
        source,
    }
}

/// One entry of a remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub path: RelPath,
    /// Remote-computed content fingerprint (hex SHA-256); empty for directories.
    pub fingerprint: String,
    pub size: u64,
    pub modified_time: Option<DateTime<Utc>>,
    pub is_directory: bool,
}

impl RemoteEntry {
    pub fn into_record(self) -> PathRecord {
        if self.is_directory {
            PathRecord::directory(self.path, self.modified_time)
        } else {
            PathRecord::file(self.path, self.fingerprint, self.size, self.modified_time)
        }
    }
}

/// An in-progress chunked upload. Chunks arrive in order.
pub trait UploadSession: Send {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError>;

    /// Commit the uploaded bytes to the target path.
    fn finish(self: Box<Self>) -> Result<(), TransportError>;

    /// Discard the session; the target path is left untouched.
    fn abort(self: Box<Self>) {}
}

/// Operations the sync engine needs from a remote project.
pub trait RemoteTransport: Send + Sync {
    /// Every file and folder in the project, at any depth.
    fn list_files(&self) -> Result<Vec<RemoteEntry>, TransportError>;

    /// Fresh metadata for a single path, `None` if absent.
    fn stat(&self, path: &RelPath) -> Result<Option<RemoteEntry>, TransportError>;

    /// Single-request upload; creates missing parent folders.
    fn upload_small(&self, path: &RelPath, bytes: &[u8]) -> Result<(), TransportError>;

    /// Start a chunked upload of `total` bytes; creates missing parent folders.
    fn begin_chunked_upload(
        &self,
        path: &RelPath,
        total: u64,
    ) -> Result<Box<dyn UploadSession + '_>, TransportError>;

    /// Stream the content of a remote file.
    fn download(&self, path: &RelPath) -> Result<Box<dyn Read + Send + '_>, TransportError>;

    /// Create a folder (and any missing parents).
    fn create_dir(&self, path: &RelPath) -> Result<(), TransportError>;

    /// Remove a file or an empty folder.
    fn delete(&self, path: &RelPath) -> Result<(), TransportError>;
}
