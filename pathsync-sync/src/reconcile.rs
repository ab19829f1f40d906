//! Three-way reconciliation of index, local and remote views.
//!
//! Every path in the union of the three views gets a [`ChangeSignature`]
//! (`XYZ`: X = tracked in the index, Y = present locally and new or changed,
//! Z = present remotely and new or changed). For tracked paths each `0` bit
//! is refined by a [`SideState`] into "absent" or "unchanged", which is what
//! separates a one-sided edit from an edit-versus-delete conflict.
//!
//! | sig | refinement                    | action                          |
//! |-----|-------------------------------|---------------------------------|
//! | 111 | same content                  | `NoOp` (record converged state) |
//! | 111 | different content             | `Conflict(BothModified)`        |
//! | 110 | remote absent                 | `Conflict(LocalEditRemoteDelete)` |
//! | 110 | remote unchanged              | `Upload`                        |
//! | 101 | local absent                  | `Conflict(LocalDeleteRemoteEdit)` |
//! | 101 | local unchanged               | `Download`                      |
//! | 100 | both unchanged                | `NoOp`                          |
//! | 100 | both absent                   | `RemoveFromIndex`               |
//! | 100 | local absent, remote unchanged| `DeleteRemote`                  |
//! | 100 | local unchanged, remote absent| `DeleteLocal`                   |
//! | 011 | same content                  | `NoOp` (start tracking)         |
//! | 011 | different content             | `Conflict(BothAdded)`           |
//! | 010 |                               | `Upload`                        |
//! | 001 |                               | `Download`                      |
//!
//! Content equality is decided by hash alone. Timestamps never influence the
//! outcome.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use pathsync_core::{Manifest, PathRecord, RelPath, Snapshot};

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// State of one side of a path relative to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideState {
    Absent,
    /// Present with the indexed content.
    Unchanged,
    /// Present and either untracked or different from the index.
    Changed,
}

impl SideState {
    fn of(index: Option<&PathRecord>, side: Option<&PathRecord>) -> Self {
        match (index, side) {
            (_, None) => SideState::Absent,
            (Some(known), Some(current)) if known.same_content(current) => SideState::Unchanged,
            (_, Some(_)) => SideState::Changed,
        }
    }

    fn bit(self) -> bool {
        self == SideState::Changed
    }
}

/// Three-bit classification of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeSignature {
    pub index: bool,
    pub local: bool,
    pub remote: bool,
}

impl ChangeSignature {
    /// Binary code `XYZ` in 0–7.
    pub fn code(&self) -> u8 {
        (u8::from(self.index) << 2) | (u8::from(self.local) << 1) | u8::from(self.remote)
    }
}

impl fmt::Display for ChangeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03b}", self.code())
    }
}

/// Signature plus the per-side refinement for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub signature: ChangeSignature,
    pub local: SideState,
    pub remote: SideState,
}

/// Classify a path from its three records.
pub fn classify(
    index: Option<&PathRecord>,
    local: Option<&PathRecord>,
    remote: Option<&PathRecord>,
) -> Classification {
    let local_state = SideState::of(index, local);
    let remote_state = SideState::of(index, remote);
    Classification {
        signature: ChangeSignature {
            index: index.is_some(),
            local: local_state.bit(),
            remote: remote_state.bit(),
        },
        local: local_state,
        remote: remote_state,
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Why a path needs an external decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// 111: edited on both sides with different results.
    BothModified,
    /// 110: edited locally, deleted remotely.
    LocalEditRemoteDelete,
    /// 101: deleted locally, edited remotely.
    LocalDeleteRemoteEdit,
    /// 011: created on both sides with different content.
    BothAdded,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConflictKind::BothModified => "modified on both sides",
            ConflictKind::LocalEditRemoteDelete => "edited locally, deleted remotely",
            ConflictKind::LocalDeleteRemoteEdit => "deleted locally, edited remotely",
            ConflictKind::BothAdded => "added on both sides with different content",
        };
        f.write_str(label)
    }
}

/// A path that cannot be synced without a decision from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub path: RelPath,
    pub kind: ConflictKind,
    pub index: Option<PathRecord>,
    pub local: Option<PathRecord>,
    pub remote: Option<PathRecord>,
}

/// What to do with one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send the local content (file or folder) to the remote.
    Upload { path: RelPath, local: PathRecord },
    /// Fetch the remote content (file or folder) into the local tree.
    Download { path: RelPath, remote: PathRecord },
    DeleteLocal { path: RelPath },
    DeleteRemote { path: RelPath },
    Conflict(Conflict),
    /// Nothing to transfer. `record`, when set, replaces the index entry.
    NoOp { path: RelPath, record: Option<PathRecord> },
    /// Gone on both sides; drop the index entry.
    RemoveFromIndex { path: RelPath },
}

/// Discriminant of [`Action`], for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Upload,
    Download,
    DeleteLocal,
    DeleteRemote,
    Conflict,
    NoOp,
    RemoveFromIndex,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionKind::Upload => "upload",
            ActionKind::Download => "download",
            ActionKind::DeleteLocal => "delete-local",
            ActionKind::DeleteRemote => "delete-remote",
            ActionKind::Conflict => "conflict",
            ActionKind::NoOp => "no-op",
            ActionKind::RemoveFromIndex => "remove-from-index",
        };
        f.write_str(label)
    }
}

impl Action {
    pub fn path(&self) -> &RelPath {
        match self {
            Action::Upload { path, .. }
            | Action::Download { path, .. }
            | Action::DeleteLocal { path }
            | Action::DeleteRemote { path }
            | Action::NoOp { path, .. }
            | Action::RemoveFromIndex { path } => path,
            Action::Conflict(conflict) => &conflict.path,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Upload { .. } => ActionKind::Upload,
            Action::Download { .. } => ActionKind::Download,
            Action::DeleteLocal { .. } => ActionKind::DeleteLocal,
            Action::DeleteRemote { .. } => ActionKind::DeleteRemote,
            Action::Conflict(_) => ActionKind::Conflict,
            Action::NoOp { .. } => ActionKind::NoOp,
            Action::RemoveFromIndex { .. } => ActionKind::RemoveFromIndex,
        }
    }

    /// `true` if the action concerns a directory rather than a file.
    pub fn is_directory(&self) -> bool {
        match self {
            Action::Upload { local, .. } => local.is_directory,
            Action::Download { remote, .. } => remote.is_directory,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Decision table
// ---------------------------------------------------------------------------

/// Decide the action for one path.
pub fn decide(
    path: &RelPath,
    index: Option<&PathRecord>,
    local: Option<&PathRecord>,
    remote: Option<&PathRecord>,
) -> Action {
    use SideState::{Absent, Changed, Unchanged};

    let class = classify(index, local, remote);
    let path = path.clone();
    let conflict = |kind| {
        Action::Conflict(Conflict {
            path: path.clone(),
            kind,
            index: index.cloned(),
            local: local.cloned(),
            remote: remote.cloned(),
        })
    };

    match (index, local, remote, class.local, class.remote) {
        // 111 / 011: present and new-or-changed on both sides.
        (_, Some(l), Some(r), Changed, Changed) => {
            if l.same_content(r) {
                Action::NoOp { path: path.clone(), record: Some(l.clone()) }
            } else if index.is_some() {
                conflict(ConflictKind::BothModified)
            } else {
                conflict(ConflictKind::BothAdded)
            }
        }
        // 110
        (Some(_), Some(_), _, Changed, Absent) => conflict(ConflictKind::LocalEditRemoteDelete),
        (Some(_), Some(l), _, Changed, Unchanged) => Action::Upload { path: path.clone(), local: l.clone() },
        // 101
        (Some(_), _, Some(_), Absent, Changed) => conflict(ConflictKind::LocalDeleteRemoteEdit),
        (Some(_), _, Some(r), Unchanged, Changed) => Action::Download { path: path.clone(), remote: r.clone() },
        // 100
        (Some(_), Some(l), _, Unchanged, Unchanged) => Action::NoOp { path: path.clone(), record: Some(l.clone()) },
        (Some(_), _, _, Absent, Absent) => Action::RemoveFromIndex { path: path.clone() },
        (Some(_), _, _, Absent, Unchanged) => Action::DeleteRemote { path: path.clone() },
        (Some(_), _, _, Unchanged, Absent) => Action::DeleteLocal { path: path.clone() },
        // 010
        (None, Some(l), None, _, _) => Action::Upload { path: path.clone(), local: l.clone() },
        // 001
        (None, None, Some(r), _, _) => Action::Download { path: path.clone(), remote: r.clone() },
        // 000: not reachable for a path drawn from the union of the views.
        _ => Action::NoOp { path: path.clone(), record: None },
    }
}

/// Reconcile the three views into one action per path, sorted by path.
///
/// Pure: the result depends only on the records, never on iteration order
/// or the clock.
pub fn reconcile(index: &Manifest, local: &Snapshot, remote: &Snapshot) -> Vec<Action> {
    let paths: BTreeSet<&RelPath> = index
        .records()
        .keys()
        .chain(local.keys())
        .chain(remote.keys())
        .collect();

    let actions: Vec<Action> = paths
        .into_iter()
        .map(|path| decide(path, index.get(path), local.get(path), remote.get(path)))
        .collect();

    tracing::debug!("reconciled {} paths", actions.len());
    actions
}
