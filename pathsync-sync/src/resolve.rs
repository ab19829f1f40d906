//! Caller-chosen conflict resolutions.
//!
//! The reconciler never picks a winner. A caller that has made a decision
//! turns each [`Conflict`] into ordinary actions here, before planning.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::Path;

use chrono::{DateTime, Utc};

use pathsync_core::{PathRecord, RelPath};

use crate::error::{io_err, SyncError};
use crate::reconcile::{Action, Conflict};
use crate::scanner::mtime_of;

/// How to settle a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Local wins: overwrite (or delete) the remote copy.
    KeepLocal,
    /// Remote wins: overwrite (or delete) the local copy.
    KeepRemote,
    /// Rename the local file aside, upload it, and take the remote version.
    KeepBoth,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::KeepLocal => write!(f, "local"),
            Resolution::KeepRemote => write!(f, "remote"),
            Resolution::KeepBoth => write!(f, "both"),
        }
    }
}

/// Name of the aside copy: `dir/report.txt` → `dir/report_CONFLICT20240301T120000.txt`.
pub fn conflict_copy_path(path: &RelPath, at: DateTime<Utc>) -> RelPath {
    path.with_stem_suffix(&format!("_CONFLICT{}", at.format("%Y%m%dT%H%M%S")))
}

/// `attempt`-th candidate name; the first is [`conflict_copy_path`], later
/// ones append `_2`, `_3`, ...
fn conflict_copy_candidate(path: &RelPath, at: DateTime<Utc>, attempt: u32) -> RelPath {
    if attempt <= 1 {
        return conflict_copy_path(path, at);
    }
    path.with_stem_suffix(&format!("_CONFLICT{}_{attempt}", at.format("%Y%m%dT%H%M%S")))
}

fn keep_local(conflict: &Conflict) -> Action {
    match &conflict.local {
        Some(local) => Action::Upload {
            path: conflict.path.clone(),
            local: local.clone(),
        },
        None => Action::DeleteRemote {
            path: conflict.path.clone(),
        },
    }
}

fn keep_remote(conflict: &Conflict) -> Action {
    match &conflict.remote {
        Some(remote) => Action::Download {
            path: conflict.path.clone(),
            remote: remote.clone(),
        },
        None => Action::DeleteLocal {
            path: conflict.path.clone(),
        },
    }
}

/// Turn one conflict into actions.
///
/// `KeepBoth` copies the local file aside under `root` immediately; the copy
/// is then uploaded like any new file. Folders cannot be kept aside, so a
/// `KeepBoth` involving a local folder leaves the conflict in place.
pub fn resolve(
    root: &Path,
    conflict: &Conflict,
    resolution: Resolution,
    at: DateTime<Utc>,
) -> Result<Vec<Action>, SyncError> {
    let actions = match resolution {
        Resolution::KeepLocal => vec![keep_local(conflict)],
        Resolution::KeepRemote => vec![keep_remote(conflict)],
        Resolution::KeepBoth => match (&conflict.local, &conflict.remote) {
            (Some(local), Some(remote)) if !local.is_directory => {
                let (aside, record) = copy_aside(root, &conflict.path, at, local)?;
                tracing::info!("kept local {} as {}", conflict.path, aside);
                vec![
                    Action::Upload {
                        path: aside,
                        local: record,
                    },
                    Action::Download {
                        path: conflict.path.clone(),
                        remote: remote.clone(),
                    },
                ]
            }
            (Some(_), Some(_)) => {
                tracing::warn!("cannot keep both versions of folder {}", conflict.path);
                vec![Action::Conflict(conflict.clone())]
            }
            // Only one side still exists; keeping both means keeping it.
            (Some(_), None) => vec![keep_local(conflict)],
            (None, _) => vec![keep_remote(conflict)],
        },
    };
    Ok(actions)
}

/// Copy the local file to the first free conflict name. Existing files are
/// never overwritten.
fn copy_aside(
    root: &Path,
    path: &RelPath,
    at: DateTime<Utc>,
    local: &PathRecord,
) -> Result<(RelPath, PathRecord), SyncError> {
    let from = path.to_path(root);
    let mut source = File::open(&from).map_err(|e| io_err(&from, e))?;
    let mut attempt = 1;
    loop {
        let aside = conflict_copy_candidate(path, at, attempt);
        let to = aside.to_path(root);
        let mut dest = match OpenOptions::new().write(true).create_new(true).open(&to) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!("{aside} already exists, trying the next name");
                attempt += 1;
                continue;
            }
            Err(err) => return Err(io_err(&to, err)),
        };
        io::copy(&mut source, &mut dest).map_err(|e| io_err(&to, e))?;
        dest.sync_all().map_err(|e| io_err(&to, e))?;
        let meta = dest.metadata().map_err(|e| io_err(&to, e))?;
        let record = PathRecord::file(
            aside.clone(),
            local.content_hash.clone(),
            meta.len(),
            mtime_of(&meta),
        );
        return Ok((aside, record));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{ActionKind, ConflictKind};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn rel(s: &str) -> RelPath {
        RelPath::parse(s).unwrap()
    }

    fn conflict(kind: ConflictKind, local: Option<&str>, remote: Option<&str>) -> Conflict {
        let path = rel("notes/todo.txt");
        Conflict {
            path: path.clone(),
            kind,
            index: Some(PathRecord::file(path.clone(), "00", 1, None)),
            local: local.map(|h| PathRecord::file(path.clone(), h, 2, None)),
            remote: remote.map(|h| PathRecord::file(path.clone(), h, 2, None)),
        }
    }

    fn kinds(actions: &[Action]) -> Vec<ActionKind> {
        actions.iter().map(Action::kind).collect()
    }

    #[test]
    fn keep_local_uploads_or_deletes_remote() {
        let tmp = TempDir::new().unwrap();
        let now = Utc::now();
        let edit = conflict(ConflictKind::BothModified, Some("aa"), Some("bb"));
        assert_eq!(kinds(&resolve(tmp.path(), &edit, Resolution::KeepLocal, now).unwrap()), vec![ActionKind::Upload]);

        let deleted = conflict(ConflictKind::LocalDeleteRemoteEdit, None, Some("bb"));
        assert_eq!(
            kinds(&resolve(tmp.path(), &deleted, Resolution::KeepLocal, now).unwrap()),
            vec![ActionKind::DeleteRemote]
        );
    }

    #[test]
    fn keep_remote_downloads_or_deletes_local() {
        let tmp = TempDir::new().unwrap();
        let now = Utc::now();
        let edit = conflict(ConflictKind::BothModified, Some("aa"), Some("bb"));
        assert_eq!(kinds(&resolve(tmp.path(), &edit, Resolution::KeepRemote, now).unwrap()), vec![ActionKind::Download]);

        let deleted = conflict(ConflictKind::LocalEditRemoteDelete, Some("aa"), None);
        assert_eq!(
            kinds(&resolve(tmp.path(), &deleted, Resolution::KeepRemote, now).unwrap()),
            vec![ActionKind::DeleteLocal]
        );
    }

    #[test]
    fn keep_both_copies_local_aside() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("notes")).unwrap();
        std::fs::write(tmp.path().join("notes/todo.txt"), "mine").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let edit = conflict(ConflictKind::BothModified, Some("aa"), Some("bb"));
        let actions = resolve(tmp.path(), &edit, Resolution::KeepBoth, at).unwrap();

        assert_eq!(kinds(&actions), vec![ActionKind::Upload, ActionKind::Download]);
        assert_eq!(actions[0].path().as_str(), "notes/todo_CONFLICT20240301T120000.txt");
        let copy = tmp.path().join("notes/todo_CONFLICT20240301T120000.txt");
        assert_eq!(std::fs::read_to_string(copy).unwrap(), "mine");
        assert_eq!(actions[1].path().as_str(), "notes/todo.txt");
    }

    #[test]
    fn keep_both_never_overwrites_an_existing_copy() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("notes")).unwrap();
        std::fs::write(tmp.path().join("notes/todo.txt"), "mine").unwrap();
        let taken = tmp.path().join("notes/todo_CONFLICT20240301T120000.txt");
        std::fs::write(&taken, "earlier copy").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let edit = conflict(ConflictKind::BothModified, Some("aa"), Some("bb"));
        let actions = resolve(tmp.path(), &edit, Resolution::KeepBoth, at).unwrap();

        assert_eq!(actions[0].path().as_str(), "notes/todo_CONFLICT20240301T120000_2.txt");
        assert_eq!(std::fs::read_to_string(&taken).unwrap(), "earlier copy");
        let copy = tmp.path().join("notes/todo_CONFLICT20240301T120000_2.txt");
        assert_eq!(std::fs::read_to_string(copy).unwrap(), "mine");
    }

    #[test]
    fn keep_both_with_one_side_keeps_that_side() {
        let tmp = TempDir::new().unwrap();
        let now = Utc::now();
        let remote_gone = conflict(ConflictKind::LocalEditRemoteDelete, Some("aa"), None);
        assert_eq!(kinds(&resolve(tmp.path(), &remote_gone, Resolution::KeepBoth, now).unwrap()), vec![ActionKind::Upload]);

        let local_gone = conflict(ConflictKind::LocalDeleteRemoteEdit, None, Some("bb"));
        assert_eq!(kinds(&resolve(tmp.path(), &local_gone, Resolution::KeepBoth, now).unwrap()), vec![ActionKind::Download]);
    }

    #[test]
    fn keep_both_on_folder_stays_conflicted() {
        let tmp = TempDir::new().unwrap();
        let mut clash = conflict(ConflictKind::BothAdded, Some("aa"), Some("bb"));
        clash.local = Some(PathRecord::directory(clash.path.clone(), None));
        let actions = resolve(tmp.path(), &clash, Resolution::KeepBoth, Utc::now()).unwrap();
        assert_eq!(kinds(&actions), vec![ActionKind::Conflict]);
    }
}
