//! Unified diff of the local and remote content of one path, for `pathsync diff`.

use std::io::{ErrorKind, Read};
use std::path::Path;

use similar::TextDiff;

use pathsync_core::RelPath;

use crate::error::{io_err, SyncError};
use crate::hashing::hash_bytes;
use crate::transport::{RemoteTransport, TransportError};

/// Comparison of the two sides of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathDiff {
    /// Byte-identical on both sides (or absent on both).
    Identical,
    /// Text content that differs; a unified diff from local to remote.
    Text(String),
    /// Non-UTF-8 content that differs. Fingerprints, `None` where absent.
    Binary {
        local: Option<String>,
        remote: Option<String>,
    },
}

/// Compare the local file at `path` with its remote counterpart.
///
/// A side that does not exist compares as empty. Nothing is written.
pub fn diff_path(root: &Path, transport: &dyn RemoteTransport, path: &RelPath) -> Result<PathDiff, SyncError> {
    let local = read_local(root, path)?;
    let remote = read_remote(transport, path)?;

    if local == remote {
        return Ok(PathDiff::Identical);
    }

    let as_text = |bytes: &Option<Vec<u8>>| match bytes {
        Some(b) => std::str::from_utf8(b).ok().map(str::to_owned),
        None => Some(String::new()),
    };
    match (as_text(&local), as_text(&remote)) {
        (Some(old), Some(new)) => {
            let old_header = format!("local/{path}");
            let new_header = format!("remote/{path}");
            let unified = TextDiff::from_lines(&old, &new)
                .unified_diff()
                .header(&old_header, &new_header)
                .context_radius(3)
                .to_string();
            Ok(PathDiff::Text(unified))
        }
        _ => Ok(PathDiff::Binary {
            local: local.as_deref().map(hash_bytes),
            remote: remote.as_deref().map(hash_bytes),
        }),
    }
}

fn read_local(root: &Path, path: &RelPath) -> Result<Option<Vec<u8>>, SyncError> {
    let full = path.to_path(root);
    match std::fs::read(&full) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(&full, err)),
    }
}

fn read_remote(transport: &dyn RemoteTransport, path: &RelPath) -> Result<Option<Vec<u8>>, SyncError> {
    let mut reader = match transport.download(path) {
        Ok(reader) => reader,
        Err(TransportError::NotFound(_)) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| io_err(path.as_str(), e))?;
    Ok(Some(bytes))
}
