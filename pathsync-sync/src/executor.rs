//! Transfer executor: carries out one planned action against the local tree
//! and the remote transport.
//!
//! Nothing is reported as synced unless it was verified:
//! - an upload hashes the bytes actually sent, then re-reads the remote
//!   entry and compares fingerprints;
//! - a download streams into `<target>.pathsync.tmp`, hashing as it writes,
//!   and is renamed into place only when the hash matches.
//!
//! When a path changed kind (a file replaced by a folder or the reverse), the
//! stale entry on the receiving side is removed right before the new one is
//! written. The planner has already run the deletions of a replaced folder's
//! children, so the folder is empty by then.
//!
//! The executor never touches the manifest. It returns an [`IndexUpdate`]
//! that the orchestrator applies.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use pathsync_core::{paths, PathRecord, RelPath, TransferConfig};

use crate::error::{io_err, SyncError};
use crate::progress::ProgressObserver;
use crate::reconcile::{Action, ActionKind};
use crate::scanner::mtime_of;
use crate::transport::{RemoteTransport, TransportError};

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Manifest change implied by a successful action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexUpdate {
    /// Store this record as the synced state of the path.
    Record(PathRecord),
    /// The path no longer exists on either side.
    Forget,
    /// Leave the manifest entry as it is.
    Keep,
}

/// Result of executing a single action.
#[derive(Debug)]
pub struct ActionOutcome {
    pub path: RelPath,
    pub kind: ActionKind,
    pub result: Result<IndexUpdate, SyncError>,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Executes actions for one project. Shared by reference between workers.
pub struct Executor<'a> {
    root: &'a Path,
    transport: &'a dyn RemoteTransport,
    transfer: TransferConfig,
    observer: &'a dyn ProgressObserver,
}

impl<'a> Executor<'a> {
    pub fn new(
        root: &'a Path,
        transport: &'a dyn RemoteTransport,
        transfer: TransferConfig,
        observer: &'a dyn ProgressObserver,
    ) -> Self {
        Self {
            root,
            transport,
            transfer,
            observer,
        }
    }

    /// Execute `action` and report its outcome. Never panics on I/O failure;
    /// errors are returned inside the outcome.
    pub fn execute(&self, action: &Action) -> ActionOutcome {
        let result = match action {
            Action::Upload { path, local } => self.upload(path, local).map(IndexUpdate::Record),
            Action::Download { path, remote } => self.download(path, remote).map(IndexUpdate::Record),
            Action::DeleteLocal { path } => self.delete_local(path).map(|()| IndexUpdate::Forget),
            Action::DeleteRemote { path } => self.delete_remote(path).map(|()| IndexUpdate::Forget),
            Action::NoOp { record: Some(record), .. } => Ok(IndexUpdate::Record(record.clone())),
            Action::NoOp { record: None, .. } | Action::Conflict(_) => Ok(IndexUpdate::Keep),
            Action::RemoveFromIndex { .. } => Ok(IndexUpdate::Forget),
        };

        match &result {
            Ok(_) => tracing::debug!("{} {}: ok", action.kind(), action.path()),
            Err(err) => tracing::warn!("{} {} failed: {err}", action.kind(), action.path()),
        }
        ActionOutcome {
            path: action.path().clone(),
            kind: action.kind(),
            result,
        }
    }

    // -- upload -------------------------------------------------------------

    /// Send local content to the remote and verify it arrived intact.
    pub fn upload(&self, path: &RelPath, local: &PathRecord) -> Result<PathRecord, SyncError> {
        if local.is_directory {
            self.clear_remote_kind(path, true)?;
            self.transport.create_dir(path)?;
            return match self.transport.stat(path)? {
                Some(entry) if entry.is_directory => Ok(local.clone()),
                other => Err(SyncError::UploadVerificationFailed {
                    path: path.clone(),
                    expected: "directory".into(),
                    actual: describe(other.map(|e| e.fingerprint)),
                }),
            };
        }

        let full = path.to_path(self.root);
        let file = File::open(&full).map_err(|e| io_err(&full, e))?;
        let meta = file.metadata().map_err(|e| io_err(&full, e))?;
        let total = meta.len();
        self.clear_remote_kind(path, false)?;

        let (sent_hash, sent_len) = if total < self.transfer.chunk_threshold {
            self.upload_whole(path, &full, file, total)?
        } else {
            self.upload_chunked(path, &full, file, total)?
        };

        let remote = self.transport.stat(path)?;
        match remote {
            Some(entry) if !entry.is_directory && entry.fingerprint == sent_hash => {}
            other => {
                return Err(SyncError::UploadVerificationFailed {
                    path: path.clone(),
                    expected: sent_hash,
                    actual: describe(other.map(|e| e.fingerprint)),
                })
            }
        }

        self.observer.on_event(&format!("uploaded {path}"));
        Ok(PathRecord::file(path.clone(), sent_hash, sent_len, mtime_of(&meta)))
    }

    fn upload_whole(
        &self,
        path: &RelPath,
        full: &Path,
        mut file: File,
        total: u64,
    ) -> Result<(String, u64), SyncError> {
        let mut bytes = Vec::with_capacity(total as usize);
        file.read_to_end(&mut bytes).map_err(|e| io_err(full, e))?;
        let digest = hex::encode(Sha256::digest(&bytes));
        self.transport.upload_small(path, &bytes)?;
        let sent = bytes.len() as u64;
        self.observer.on_progress(path, sent, sent);
        Ok((digest, sent))
    }

    fn upload_chunked(
        &self,
        path: &RelPath,
        full: &Path,
        mut file: File,
        total: u64,
    ) -> Result<(String, u64), SyncError> {
        let mut session = self.transport.begin_chunked_upload(path, total)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; self.transfer.chunk_size.max(1)];
        let mut sent = 0u64;

        loop {
            let n = match fill_chunk(&mut file, &mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    session.abort();
                    return Err(io_err(full, err));
                }
            };
            if let Err(err) = session.write_chunk(&buf[..n]) {
                session.abort();
                return Err(err.into());
            }
            hasher.update(&buf[..n]);
            sent += n as u64;
            self.observer.on_progress(path, sent, total);
        }

        session.finish()?;
        tracing::debug!("chunked upload of {path}: {sent} bytes");
        Ok((hex::encode(hasher.finalize()), sent))
    }

    // -- download -----------------------------------------------------------

    /// Fetch remote content into the local tree, verifying before it lands.
    pub fn download(&self, path: &RelPath, remote: &PathRecord) -> Result<PathRecord, SyncError> {
        let target = path.to_path(self.root);
        if remote.is_directory {
            self.clear_local_kind(path, true)?;
            fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
            let meta = fs::metadata(&target).map_err(|e| io_err(&target, e))?;
            return Ok(PathRecord::directory(path.clone(), mtime_of(&meta)));
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let tmp = paths::tmp_sibling(&target);
        let (hash, len) = match self.stream_to(path, remote.size, &tmp) {
            Ok(received) => received,
            Err(err) => {
                let _ = fs::remove_file(&tmp);
                return Err(err);
            }
        };

        if hash != remote.content_hash {
            let _ = fs::remove_file(&tmp);
            return Err(SyncError::DownloadVerificationFailed {
                path: path.clone(),
                expected: remote.content_hash.clone(),
                actual: hash,
            });
        }

        if let Err(err) = self.clear_local_kind(path, false) {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(&target, e));
        }
        let meta = fs::metadata(&target).map_err(|e| io_err(&target, e))?;
        self.observer.on_event(&format!("downloaded {path}"));
        Ok(PathRecord::file(path.clone(), hash, len, mtime_of(&meta)))
    }

    fn stream_to(&self, path: &RelPath, total: u64, tmp: &Path) -> Result<(String, u64), SyncError> {
        let mut reader = self.transport.download(path)?;
        let file = File::create(tmp).map_err(|e| io_err(tmp, e))?;
        let mut writer = BufWriter::new(file);
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; self.transfer.chunk_size.max(1)];
        let mut received = 0u64;

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(io_err(tmp, err)),
            };
            writer.write_all(&buf[..n]).map_err(|e| io_err(tmp, e))?;
            hasher.update(&buf[..n]);
            received += n as u64;
            self.observer.on_progress(path, received, total.max(received));
        }

        let file = writer.into_inner().map_err(|e| io_err(tmp, e.into_error()))?;
        file.sync_all().map_err(|e| io_err(tmp, e))?;
        Ok((hex::encode(hasher.finalize()), received))
    }

    // -- kind changes -------------------------------------------------------

    /// Remove a remote entry at `path` whose kind differs from the one about
    /// to be written.
    fn clear_remote_kind(&self, path: &RelPath, directory: bool) -> Result<(), SyncError> {
        match self.transport.stat(path)? {
            Some(entry) if entry.is_directory != directory => {
                tracing::info!("replacing remote {} at {path}", kind_label(entry.is_directory));
                self.delete_remote(path)
            }
            _ => Ok(()),
        }
    }

    /// Local counterpart of [`Executor::clear_remote_kind`]. Symlinks are
    /// left alone.
    fn clear_local_kind(&self, path: &RelPath, directory: bool) -> Result<(), SyncError> {
        let full = path.to_path(self.root);
        let meta = match fs::symlink_metadata(&full) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(io_err(&full, err)),
        };
        if (meta.is_dir() && !directory) || (meta.is_file() && directory) {
            tracing::info!("replacing local {} at {path}", kind_label(meta.is_dir()));
            self.delete_local(path)?;
        }
        Ok(())
    }

    // -- deletes ------------------------------------------------------------

    /// Remove a local file or empty folder. Already gone counts as done.
    pub fn delete_local(&self, path: &RelPath) -> Result<(), SyncError> {
        let full = path.to_path(self.root);
        let meta = match fs::symlink_metadata(&full) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(delete_failed(path, err)),
        };
        let removed = if meta.is_dir() {
            fs::remove_dir(&full)
        } else {
            fs::remove_file(&full)
        };
        match removed {
            Ok(()) => {
                self.observer.on_event(&format!("deleted local {path}"));
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(delete_failed(path, err)),
        }
    }

    /// Remove a remote file or empty folder. Already gone counts as done.
    pub fn delete_remote(&self, path: &RelPath) -> Result<(), SyncError> {
        match self.transport.delete(path) {
            Ok(()) => {
                self.observer.on_event(&format!("deleted remote {path}"));
                Ok(())
            }
            Err(TransportError::NotFound(_)) => Ok(()),
            Err(err) => Err(delete_failed(path, err)),
        }
    }
}

fn delete_failed(path: &RelPath, reason: impl ToString) -> SyncError {
    SyncError::DeleteFailed {
        path: path.clone(),
        reason: reason.to_string(),
    }
}

fn kind_label(directory: bool) -> &'static str {
    if directory {
        "folder"
    } else {
        "file"
    }
}

fn describe(fingerprint: Option<String>) -> String {
    fingerprint.unwrap_or_else(|| "nothing".into())
}

/// Read until `buf` is full or the reader is exhausted.
fn fill_chunk(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir_remote::DirRemote;
    use crate::hashing::hash_bytes;
    use crate::progress::NullObserver;
    use crate::transport::{RemoteEntry, UploadSession};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn rel(s: &str) -> RelPath {
        RelPath::parse(s).unwrap()
    }

    struct Sandbox {
        _tmp: TempDir,
        local: PathBuf,
        remote: DirRemote,
    }

    fn sandbox() -> Sandbox {
        let tmp = TempDir::new().expect("tempdir");
        let local = tmp.path().join("local");
        fs::create_dir_all(&local).expect("mkdir");
        let remote = DirRemote::create_project(tmp.path().join("remote")).expect("remote");
        Sandbox { _tmp: tmp, local, remote }
    }

    fn local_file(root: &Path, name: &str, body: &[u8]) -> PathRecord {
        let full = root.join(name);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full, body).unwrap();
        PathRecord::file(rel(name), hash_bytes(body), body.len() as u64, None)
    }

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<(u64, u64)>>,
    }

    impl ProgressObserver for Recorder {
        fn on_progress(&self, _path: &RelPath, transferred: u64, total: u64) {
            self.progress.lock().unwrap().push((transferred, total));
        }
    }

    /// Accepts uploads but reports a different fingerprint afterwards.
    struct LyingRemote(DirRemote);

    impl RemoteTransport for LyingRemote {
        fn list_files(&self) -> Result<Vec<RemoteEntry>, TransportError> {
            self.0.list_files()
        }
        fn stat(&self, path: &RelPath) -> Result<Option<RemoteEntry>, TransportError> {
            Ok(self.0.stat(path)?.map(|mut e| {
                e.fingerprint = "0badc0de".into();
                e
            }))
        }
        fn upload_small(&self, path: &RelPath, bytes: &[u8]) -> Result<(), TransportError> {
            self.0.upload_small(path, bytes)
        }
        fn begin_chunked_upload(
            &self,
            path: &RelPath,
            total: u64,
        ) -> Result<Box<dyn UploadSession + '_>, TransportError> {
            self.0.begin_chunked_upload(path, total)
        }
        fn download(&self, path: &RelPath) -> Result<Box<dyn Read + Send + '_>, TransportError> {
            self.0.download(path)
        }
        fn create_dir(&self, path: &RelPath) -> Result<(), TransportError> {
            self.0.create_dir(path)
        }
        fn delete(&self, path: &RelPath) -> Result<(), TransportError> {
            self.0.delete(path)
        }
    }

    #[test]
    fn small_upload_is_verified_and_recorded() {
        let sb = sandbox();
        let record = local_file(&sb.local, "notes/a.txt", b"hello");
        let exec = Executor::new(&sb.local, &sb.remote, TransferConfig::default(), &NullObserver);

        let synced = exec.upload(&rel("notes/a.txt"), &record).expect("upload");
        assert_eq!(synced.content_hash, hash_bytes(b"hello"));
        assert_eq!(synced.size, 5);
        assert!(synced.modified_time.is_some());
        assert_eq!(fs::read(sb.remote.root().join("notes/a.txt")).unwrap(), b"hello");
    }

    #[test]
    fn large_upload_goes_in_chunks() {
        let sb = sandbox();
        let body: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let record = local_file(&sb.local, "big.bin", &body);
        let transfer = TransferConfig { chunk_threshold: 1024, chunk_size: 4096 };
        let recorder = Recorder::default();
        let exec = Executor::new(&sb.local, &sb.remote, transfer, &recorder);

        let synced = exec.upload(&rel("big.bin"), &record).expect("upload");
        assert_eq!(synced.content_hash, hash_bytes(&body));
        assert_eq!(
            *recorder.progress.lock().unwrap(),
            vec![(4096, 10_000), (8192, 10_000), (10_000, 10_000)]
        );
    }

    #[test]
    fn lying_remote_fails_upload_verification() {
        let sb = sandbox();
        let record = local_file(&sb.local, "a.txt", b"payload");
        let liar = LyingRemote(sb.remote.clone());
        let exec = Executor::new(&sb.local, &liar, TransferConfig::default(), &NullObserver);

        let outcome = exec.execute(&Action::Upload { path: rel("a.txt"), local: record });
        match outcome.result {
            Err(SyncError::UploadVerificationFailed { expected, actual, .. }) => {
                assert_eq!(expected, hash_bytes(b"payload"));
                assert_eq!(actual, "0badc0de");
            }
            other => panic!("expected verification failure, got {other:?}"),
        }
    }

    #[test]
    fn folder_upload_creates_remote_dir() {
        let sb = sandbox();
        fs::create_dir_all(sb.local.join("empty")).unwrap();
        let exec = Executor::new(&sb.local, &sb.remote, TransferConfig::default(), &NullObserver);
        let record = PathRecord::directory(rel("empty"), None);
        exec.upload(&rel("empty"), &record).expect("mkdir");
        assert!(sb.remote.root().join("empty").is_dir());
    }

    #[test]
    fn download_lands_atomically_and_records_local_mtime() {
        let sb = sandbox();
        sb.remote.upload_small(&rel("d/x.txt"), b"remote bytes").unwrap();
        let remote = sb.remote.stat(&rel("d/x.txt")).unwrap().unwrap().into_record();
        let exec = Executor::new(&sb.local, &sb.remote, TransferConfig::default(), &NullObserver);

        let synced = exec.download(&rel("d/x.txt"), &remote).expect("download");
        assert_eq!(fs::read(sb.local.join("d/x.txt")).unwrap(), b"remote bytes");
        assert_eq!(synced.content_hash, remote.content_hash);
        let on_disk = fs::metadata(sb.local.join("d/x.txt")).unwrap();
        assert_eq!(synced.modified_time, mtime_of(&on_disk));
        assert!(!sb.local.join("d/x.txt.pathsync.tmp").exists());
    }

    #[test]
    fn download_mismatch_leaves_target_untouched() {
        let sb = sandbox();
        sb.remote.upload_small(&rel("x.txt"), b"actual").unwrap();
        fs::write(sb.local.join("x.txt"), b"old local").unwrap();
        let claimed = PathRecord::file(rel("x.txt"), hash_bytes(b"expected"), 8, None);
        let exec = Executor::new(&sb.local, &sb.remote, TransferConfig::default(), &NullObserver);

        let err = exec.download(&rel("x.txt"), &claimed).unwrap_err();
        assert!(matches!(err, SyncError::DownloadVerificationFailed { .. }));
        assert_eq!(fs::read(sb.local.join("x.txt")).unwrap(), b"old local");
        assert!(!sb.local.join("x.txt.pathsync.tmp").exists());
    }

    #[test]
    fn file_upload_replaces_empty_remote_folder() {
        let sb = sandbox();
        sb.remote.create_dir(&rel("a")).unwrap();
        let record = local_file(&sb.local, "a", b"now a file");
        let exec = Executor::new(&sb.local, &sb.remote, TransferConfig::default(), &NullObserver);

        exec.upload(&rel("a"), &record).expect("upload over folder");
        assert_eq!(fs::read(sb.remote.root().join("a")).unwrap(), b"now a file");
    }

    #[test]
    fn folder_download_replaces_local_file() {
        let sb = sandbox();
        local_file(&sb.local, "a", b"stale file");
        sb.remote.create_dir(&rel("a")).unwrap();
        let exec = Executor::new(&sb.local, &sb.remote, TransferConfig::default(), &NullObserver);

        let synced = exec
            .download(&rel("a"), &PathRecord::directory(rel("a"), None))
            .expect("download folder");
        assert!(synced.is_directory);
        assert!(sb.local.join("a").is_dir());
    }

    #[test]
    fn file_download_does_not_remove_non_empty_folder() {
        let sb = sandbox();
        local_file(&sb.local, "a/keep.txt", b"x");
        sb.remote.upload_small(&rel("a"), b"remote file").unwrap();
        let remote = sb.remote.stat(&rel("a")).unwrap().unwrap().into_record();
        let exec = Executor::new(&sb.local, &sb.remote, TransferConfig::default(), &NullObserver);

        let err = exec.download(&rel("a"), &remote).unwrap_err();
        assert!(matches!(err, SyncError::DeleteFailed { .. }));
        assert!(sb.local.join("a/keep.txt").exists());
        assert!(!sb.local.join("a.pathsync.tmp").exists());
    }

    #[test]
    fn deleting_missing_paths_succeeds() {
        let sb = sandbox();
        let exec = Executor::new(&sb.local, &sb.remote, TransferConfig::default(), &NullObserver);
        exec.delete_local(&rel("ghost.txt")).expect("local");
        exec.delete_remote(&rel("ghost.txt")).expect("remote");
    }

    #[test]
    fn deleting_non_empty_folder_fails() {
        let sb = sandbox();
        local_file(&sb.local, "keep/inner.txt", b"x");
        let exec = Executor::new(&sb.local, &sb.remote, TransferConfig::default(), &NullObserver);
        let outcome = exec.execute(&Action::DeleteLocal { path: rel("keep") });
        assert!(matches!(outcome.result, Err(SyncError::DeleteFailed { .. })));
        assert!(sb.local.join("keep/inner.txt").exists());
    }

    #[test]
    fn bookkeeping_actions_map_to_index_updates() {
        let sb = sandbox();
        let exec = Executor::new(&sb.local, &sb.remote, TransferConfig::default(), &NullObserver);
        let gone = exec.execute(&Action::RemoveFromIndex { path: rel("c.txt") });
        assert_eq!(gone.result.unwrap(), IndexUpdate::Forget);
        let idle = exec.execute(&Action::NoOp { path: rel("n.txt"), record: None });
        assert_eq!(idle.result.unwrap(), IndexUpdate::Keep);
    }
}
