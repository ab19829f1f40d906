//! Directory-backed remote store.
//!
//! Treats a second directory (a network share, a mounted bucket, a USB
//! drive) as the remote project. Fingerprints are computed on listing, the
//! way a hosted store would report them.
//!
//! Writes land in `<target>.pathsync.part` and are renamed into place, so a
//! concurrent listing never sees a half-written file under its real name.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use pathsync_core::{paths, RelPath};

use crate::hashing::hash_reader;
use crate::scanner::mtime_of;
use crate::transport::{remote_io, RemoteEntry, RemoteTransport, TransportError, UploadSession};

/// A remote project stored as a plain directory tree.
#[derive(Debug, Clone)]
pub struct DirRemote {
    root: PathBuf,
}

impl DirRemote {
    /// Bind to an existing project directory. Reachability is checked on use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the project directory (idempotent) and bind to it.
    pub fn create_project(root: impl Into<PathBuf>) -> Result<Self, TransportError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| remote_io(&root, e))?;
        tracing::info!("created remote project at {}", root.display());
        Ok(Self { root })
    }

    /// Remove the project directory and everything in it.
    pub fn delete_project(self) -> Result<(), TransportError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(remote_io(&self.root, err)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_reachable(&self) -> Result<(), TransportError> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(TransportError::Unreachable(format!(
                "project directory {} does not exist",
                self.root.display()
            )))
        }
    }

    fn entry_for(&self, path: &RelPath, full: &Path, meta: &fs::Metadata) -> Result<RemoteEntry, TransportError> {
        if meta.is_dir() {
            return Ok(RemoteEntry {
                path: path.clone(),
                fingerprint: String::new(),
                size: 0,
                modified_time: mtime_of(meta),
                is_directory: true,
            });
        }
        let file = File::open(full).map_err(|e| remote_io(full, e))?;
        let (fingerprint, size) = hash_reader(file).map_err(|e| remote_io(full, e))?;
        Ok(RemoteEntry {
            path: path.clone(),
            fingerprint,
            size,
            modified_time: mtime_of(meta),
            is_directory: false,
        })
    }

    fn prepare_parent(&self, target: &Path) -> Result<(), TransportError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| remote_io(parent, e))?;
        }
        Ok(())
    }
}

fn part_path(target: &Path) -> PathBuf {
    PathBuf::from(format!("{}{}", target.display(), paths::PART_SUFFIX))
}

impl RemoteTransport for DirRemote {
    fn list_files(&self) -> Result<Vec<RemoteEntry>, TransportError> {
        self.ensure_reachable()?;
        let mut entries = Vec::new();
        for item in WalkDir::new(&self.root).min_depth(1).follow_links(false) {
            let item = item.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                remote_io(path, e.into())
            })?;
            let path = RelPath::from_path(&self.root, item.path())
                .map_err(|e| TransportError::Rejected(e.to_string()))?;
            if paths::is_reserved(&path) {
                continue;
            }
            if item.file_type().is_symlink() {
                continue;
            }
            let meta = item.metadata().map_err(|e| remote_io(item.path(), e.into()))?;
            entries.push(self.entry_for(&path, item.path(), &meta)?);
        }
        Ok(entries)
    }

    fn stat(&self, path: &RelPath) -> Result<Option<RemoteEntry>, TransportError> {
        self.ensure_reachable()?;
        let full = path.to_path(&self.root);
        let meta = match fs::symlink_metadata(&full) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(remote_io(&full, err)),
        };
        self.entry_for(path, &full, &meta).map(Some)
    }

    fn upload_small(&self, path: &RelPath, bytes: &[u8]) -> Result<(), TransportError> {
        self.ensure_reachable()?;
        let target = path.to_path(&self.root);
        self.prepare_parent(&target)?;
        let part = part_path(&target);
        fs::write(&part, bytes).map_err(|e| remote_io(&part, e))?;
        if let Err(e) = fs::rename(&part, &target) {
            let _ = fs::remove_file(&part);
            return Err(remote_io(&target, e));
        }
        Ok(())
    }

    fn begin_chunked_upload(
        &self,
        path: &RelPath,
        total: u64,
    ) -> Result<Box<dyn UploadSession + '_>, TransportError> {
        self.ensure_reachable()?;
        let target = path.to_path(&self.root);
        self.prepare_parent(&target)?;
        let part = part_path(&target);
        let file = File::create(&part).map_err(|e| remote_io(&part, e))?;
        tracing::debug!("chunked upload session for {path} ({total} bytes)");
        Ok(Box::new(DirUploadSession {
            writer: BufWriter::new(file),
            part,
            target,
        }))
    }

    fn download(&self, path: &RelPath) -> Result<Box<dyn Read + Send + '_>, TransportError> {
        self.ensure_reachable()?;
        let full = path.to_path(&self.root);
        match File::open(&full) {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(TransportError::NotFound(path.clone())),
            Err(err) => Err(remote_io(&full, err)),
        }
    }

    fn create_dir(&self, path: &RelPath) -> Result<(), TransportError> {
        self.ensure_reachable()?;
        let full = path.to_path(&self.root);
        fs::create_dir_all(&full).map_err(|e| remote_io(&full, e))
    }

    fn delete(&self, path: &RelPath) -> Result<(), TransportError> {
        self.ensure_reachable()?;
        let full = path.to_path(&self.root);
        let meta = match fs::symlink_metadata(&full) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(TransportError::NotFound(path.clone()))
            }
            Err(err) => return Err(remote_io(&full, err)),
        };
        let result = if meta.is_dir() {
            fs::remove_dir(&full)
        } else {
            fs::remove_file(&full)
        };
        result.map_err(|e| remote_io(&full, e))
    }
}

struct DirUploadSession {
    writer: BufWriter<File>,
    part: PathBuf,
    target: PathBuf,
}

impl UploadSession for DirUploadSession {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
        self.writer.write_all(chunk).map_err(|e| remote_io(&self.part, e))
    }

    fn finish(self: Box<Self>) -> Result<(), TransportError> {
        let DirUploadSession { writer, part, target } = *self;
        let file = writer.into_inner().map_err(|e| remote_io(&part, e.into_error()))?;
        file.sync_all().map_err(|e| remote_io(&part, e))?;
        drop(file);
        if let Err(e) = fs::rename(&part, &target) {
            let _ = fs::remove_file(&part);
            return Err(remote_io(&target, e));
        }
        Ok(())
    }

    fn abort(self: Box<Self>) {
        let DirUploadSession { writer, part, .. } = *self;
        drop(writer);
        let _ = fs::remove_file(&part);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::hash_bytes;
    use tempfile::TempDir;

    fn rel(s: &str) -> RelPath {
        RelPath::parse(s).unwrap()
    }

    #[test]
    fn list_reports_files_folders_and_fingerprints() {
        let tmp = TempDir::new().unwrap();
        let remote = DirRemote::create_project(tmp.path().join("store")).unwrap();
        remote.upload_small(&rel("docs/a.txt"), b"alpha").unwrap();

        let mut listing = remote.list_files().unwrap();
        listing.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(listing.len(), 2);
        assert!(listing[0].is_directory);
        assert_eq!(listing[0].path, rel("docs"));
        assert_eq!(listing[1].fingerprint, hash_bytes(b"alpha"));
        assert_eq!(listing[1].size, 5);
    }

    #[test]
    fn unreachable_when_project_dir_missing() {
        let tmp = TempDir::new().unwrap();
        let remote = DirRemote::new(tmp.path().join("missing"));
        assert!(matches!(remote.list_files(), Err(TransportError::Unreachable(_))));
    }

    #[test]
    fn chunked_upload_is_invisible_until_finished() {
        let tmp = TempDir::new().unwrap();
        let remote = DirRemote::create_project(tmp.path()).unwrap();
        let mut session = remote.begin_chunked_upload(&rel("big.bin"), 6).unwrap();
        session.write_chunk(b"abc").unwrap();

        assert!(remote.stat(&rel("big.bin")).unwrap().is_none());
        assert!(remote.list_files().unwrap().is_empty(), "part files are not listed");

        session.write_chunk(b"def").unwrap();
        session.finish().unwrap();
        let entry = remote.stat(&rel("big.bin")).unwrap().expect("uploaded");
        assert_eq!(entry.fingerprint, hash_bytes(b"abcdef"));
    }

    #[test]
    fn aborted_upload_leaves_no_trace() {
        let tmp = TempDir::new().unwrap();
        let remote = DirRemote::create_project(tmp.path()).unwrap();
        let mut session = remote.begin_chunked_upload(&rel("x.bin"), 3).unwrap();
        session.write_chunk(b"xyz").unwrap();
        session.abort();

        assert!(remote.stat(&rel("x.bin")).unwrap().is_none());
        assert!(!tmp.path().join("x.bin.pathsync.part").exists());
    }

    #[test]
    fn delete_missing_path_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let remote = DirRemote::create_project(tmp.path()).unwrap();
        assert!(matches!(
            remote.delete(&rel("ghost.txt")),
            Err(TransportError::NotFound(_))
        ));
    }

    #[test]
    fn delete_project_removes_everything() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("proj");
        let remote = DirRemote::create_project(&root).unwrap();
        remote.upload_small(&rel("a/b/c.txt"), b"c").unwrap();
        remote.delete_project().unwrap();
        assert!(!root.exists());
    }
}
