//! # pathsync-sync
//!
//! One-shot, three-way file synchronization between a local directory and a
//! remote project.
//!
//! A run scans both sides, reconciles them against the manifest of the last
//! successful sync, plans the resulting actions, executes them with
//! verification and commits the manifest. Start with [`SyncSession`]; use
//! [`SyncSession::preview`] for a dry run.

pub mod diff;
pub mod dir_remote;
pub mod error;
pub mod executor;
pub mod hashing;
pub mod orchestrator;
pub mod planner;
pub mod progress;
pub mod reconcile;
pub mod resolve;
pub mod scanner;
pub mod transport;

pub use dir_remote::DirRemote;
pub use error::{ScanSide, SyncError};
pub use orchestrator::{CancelToken, OutcomeStatus, PathOutcome, RunStatus, SyncPhase, SyncReport, SyncSession};
pub use planner::Plan;
pub use progress::{LogObserver, NullObserver, ProgressObserver};
pub use reconcile::{Action, ActionKind, ChangeSignature, Conflict, ConflictKind};
pub use resolve::Resolution;
pub use scanner::PathFilter;
pub use transport::{RemoteEntry, RemoteTransport, TransportError, UploadSession};
