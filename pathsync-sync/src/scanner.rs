//! Local and remote state scanners.
//!
//! Both scanners are side-effect free and either return a complete
//! [`Snapshot`] or fail with `SyncError::ScanUnavailable`; a partial view is
//! never handed to the reconciler.

use std::fs::Metadata;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use pathsync_core::{paths, Manifest, PathRecord, RelPath, Snapshot};

use crate::error::{ScanSide, SyncError};
use crate::hashing::hash_file;
use crate::transport::RemoteTransport;

/// Predicate deciding whether a path takes part in the sync.
///
/// Applied identically to the local and the remote scan, so an excluded path
/// never reaches the reconciler from either side. Only the predicate decides:
/// ancestors of an included path are not pulled in.
pub type PathFilter = Arc<dyn Fn(&RelPath) -> bool + Send + Sync>;

/// Counters from a local scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files: usize,
    pub directories: usize,
    /// Files whose hash was taken from the index (size and mtime matched).
    pub reused_hashes: usize,
}

pub(crate) fn mtime_of(meta: &Metadata) -> Option<DateTime<Utc>> {
    meta.modified().ok().map(DateTime::<Utc>::from)
}

fn included(filter: Option<&PathFilter>, path: &RelPath) -> bool {
    !paths::is_reserved(path) && filter.map_or(true, |f| f(path))
}

fn unavailable(side: ScanSide, reason: impl ToString) -> SyncError {
    SyncError::ScanUnavailable {
        side,
        reason: reason.to_string(),
    }
}

/// Walk the tree under `root` and fingerprint every regular file.
///
/// Hashing is skipped for a file whose size and modification time both equal
/// its `index` record; any other file is hashed in full. Symlinks are not
/// followed and not synced.
pub fn scan_local(
    root: &Path,
    index: &Manifest,
    filter: Option<&PathFilter>,
) -> Result<(Snapshot, ScanStats), SyncError> {
    if !root.is_dir() {
        return Err(unavailable(
            ScanSide::Local,
            format!("{} is not a directory", root.display()),
        ));
    }

    let mut snapshot = Snapshot::new();
    let mut stats = ScanStats::default();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            // Prune the state directory without descending into it.
            entry.depth() != 1 || entry.file_name() != paths::STATE_DIR
        });

    for entry in walker {
        let entry = entry.map_err(|e| unavailable(ScanSide::Local, e))?;
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            tracing::debug!("skipping symlink {}", entry.path().display());
            continue;
        }
        let path = RelPath::from_path(root, entry.path()).map_err(|e| unavailable(ScanSide::Local, e))?;
        if !included(filter, &path) {
            continue;
        }
        let meta = entry.metadata().map_err(|e| unavailable(ScanSide::Local, e))?;
        let modified = mtime_of(&meta);

        if file_type.is_dir() {
            stats.directories += 1;
            snapshot.insert(path.clone(), PathRecord::directory(path, modified));
            continue;
        }

        stats.files += 1;
        let size = meta.len();
        let reusable = index.get(&path).filter(|known| {
            !known.is_directory
                && !known.content_hash.is_empty()
                && known.size == size
                && known.modified_time.is_some()
                && known.modified_time == modified
        });
        let record = match reusable {
            Some(known) => {
                stats.reused_hashes += 1;
                PathRecord::file(path.clone(), known.content_hash.clone(), size, modified)
            }
            None => {
                let (hash, hashed_len) = hash_file(entry.path()).map_err(|e| unavailable(ScanSide::Local, e))?;
                PathRecord::file(path.clone(), hash, hashed_len, modified)
            }
        };
        snapshot.insert(path, record);
    }

    tracing::debug!(
        "local scan of {}: {} files, {} dirs, {} hashes reused",
        root.display(),
        stats.files,
        stats.directories,
        stats.reused_hashes
    );
    Ok((snapshot, stats))
}

/// List the remote project and map every entry to a [`PathRecord`].
pub fn scan_remote(
    transport: &dyn RemoteTransport,
    filter: Option<&PathFilter>,
) -> Result<Snapshot, SyncError> {
    let entries = transport
        .list_files()
        .map_err(|e| unavailable(ScanSide::Remote, e))?;

    let mut snapshot = Snapshot::new();
    for entry in entries {
        if !included(filter, &entry.path) {
            continue;
        }
        if snapshot.contains_key(&entry.path) {
            return Err(unavailable(
                ScanSide::Remote,
                format!("listing contains {} more than once", entry.path),
            ));
        }
        let record = entry.into_record();
        snapshot.insert(record.relative_path.clone(), record);
    }
    tracing::debug!("remote scan: {} entries", snapshot.len());
    Ok(snapshot)
}
