//! Manifest: the durable record of the last synchronized state.
//!
//! Persists a flat JSON document at
//! `<root>/.pathsync/manifest.json`. Writes go to a `.tmp` sibling that is
//! renamed over the target, so a concurrent or later `load_at` sees either
//! the previous document or the new one, never a partial write.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::paths;
use crate::types::{PathRecord, RelPath, Snapshot};

/// Current on-disk format version.
pub const MANIFEST_VERSION: u32 = 1;

/// In-memory manifest: last synced record per relative path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    /// Start time of the run that last committed this manifest.
    pub synced_at: Option<DateTime<Utc>>,
    records: Snapshot,
}

/// On-disk manifest payload.
#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    files: BTreeMap<RelPath, PathRecord>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &RelPath) -> Option<&PathRecord> {
        self.records.get(path)
    }

    /// Insert or replace the record for `path`.
    pub fn record(&mut self, path: RelPath, mut record: PathRecord) {
        record.relative_path = path.clone();
        self.records.insert(path, record);
    }

    /// Drop `path`; returns the previous record if there was one.
    pub fn forget(&mut self, path: &RelPath) -> Option<PathRecord> {
        self.records.remove(path)
    }

    pub fn contains(&self, path: &RelPath) -> bool {
        self.records.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RelPath, &PathRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Borrow the records as a snapshot-shaped map.
    pub fn records(&self) -> &Snapshot {
        &self.records
    }
}

impl FromIterator<PathRecord> for Manifest {
    fn from_iter<I: IntoIterator<Item = PathRecord>>(iter: I) -> Self {
        let mut manifest = Manifest::new();
        for record in iter {
            manifest.record(record.relative_path.clone(), record);
        }
        manifest
    }
}

/// Load the manifest for the project rooted at `root`.
///
/// Returns an empty manifest if the file does not exist yet (fresh project)
/// and `CoreError::ManifestCorrupt` if it exists but cannot be parsed.
pub fn load_at(root: &Path) -> Result<Manifest, CoreError> {
    let path = paths::manifest_path(root);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Manifest::new()),
        Err(err) => return Err(io_err(&path, err)),
    };
    let file: ManifestFile = serde_json::from_str(&contents)
        .map_err(|source| CoreError::ManifestCorrupt {
            path: path.clone(),
            source,
        })?;

    let mut manifest = Manifest {
        synced_at: file.synced_at,
        records: Snapshot::new(),
    };
    for (key, record) in file.files {
        // Keys bypass `RelPath::parse` during deserialization; re-validate.
        let key = RelPath::parse(key.as_str()).map_err(|_| CoreError::ManifestCorrupt {
            path: path.clone(),
            source: serde::de::Error::custom(format!("invalid path key '{key}'")),
        })?;
        manifest.record(key, record);
    }
    Ok(manifest)
}

/// Atomically persist `manifest` for the project rooted at `root`,
/// replacing any previous document.
pub fn persist_at(root: &Path, manifest: &Manifest) -> Result<(), CoreError> {
    let file = ManifestFile {
        version: MANIFEST_VERSION,
        synced_at: manifest.synced_at,
        files: manifest.records.clone(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    write_atomic(&paths::manifest_path(root), json.as_bytes())
}

/// Write `bytes` to `<path>.pathsync.tmp`, then rename over `path`.
///
/// The tmp file is always in the target's directory (same filesystem, so the
/// rename cannot fail with EXDEV) and is removed if the rename fails.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("path has no parent directory")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let tmp = paths::tmp_sibling(path);
    std::fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}
