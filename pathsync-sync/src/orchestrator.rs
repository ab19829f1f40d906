//! Sync orchestrator: one complete run from scan to commit.
//!
//! ```text
//! Idle → Scanning → Reconciling → Planning → Executing → Committing → Done
//!           └──────────────→ Failed
//! ```
//!
//! Scan failures abort the run before anything is touched. From `Executing`
//! on, failures are per action: a failed, conflicted or skipped path keeps
//! its previous manifest entry, and the committed manifest reflects exactly
//! the actions that succeeded.
//!
//! The manifest is owned by the orchestrator thread. In pooled mode, workers
//! receive actions over one channel and hand outcomes back over another.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam::channel;
use serde::Serialize;

use pathsync_core::{manifest, CommitPolicy, ExecutionMode, Manifest, RelPath, Snapshot, SyncConfig};

use crate::error::SyncError;
use crate::executor::{ActionOutcome, Executor, IndexUpdate};
use crate::planner::{plan, Plan};
use crate::progress::{NullObserver, ProgressObserver};
use crate::reconcile::{reconcile, Action, ActionKind, Conflict};
use crate::resolve::{resolve, Resolution};
use crate::scanner::{scan_local, scan_remote, PathFilter};
use crate::transport::RemoteTransport;

// ---------------------------------------------------------------------------
// Phase and cancellation
// ---------------------------------------------------------------------------

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Scanning,
    Reconciling,
    Planning,
    Executing,
    Committing,
    Done,
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Scanning => "scanning",
            SyncPhase::Reconciling => "reconciling",
            SyncPhase::Planning => "planning",
            SyncPhase::Executing => "executing",
            SyncPhase::Committing => "committing",
            SyncPhase::Done => "done",
            SyncPhase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Shared flag that stops a run from starting new actions.
///
/// Transfers already in flight run to completion; actions not yet started
/// are reported as [`OutcomeStatus::Skipped`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Final state of one path in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Synced,
    Conflicted,
    Failed(String),
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathOutcome {
    pub path: RelPath,
    pub kind: ActionKind,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

/// Overall result of a run that got past scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithFailures,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    /// One entry per planned action, sorted by path.
    pub outcomes: Vec<PathOutcome>,
    /// Conflicts left for the caller, with the records on each side.
    #[serde(skip)]
    pub conflicts: Vec<Conflict>,
}

impl SyncReport {
    pub fn failures(&self) -> impl Iterator<Item = &PathOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Failed(_)))
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Number of outcomes with the given status.
    pub fn count(&self, status: &OutcomeStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|o| std::mem::discriminant(&o.status) == std::mem::discriminant(status))
            .count()
    }

    /// Outcomes that moved bytes or deleted something.
    pub fn transfers(&self) -> impl Iterator<Item = &PathOutcome> {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o.kind, ActionKind::NoOp | ActionKind::RemoveFromIndex))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One project's sync run.
pub struct SyncSession<'a> {
    root: PathBuf,
    transport: &'a dyn RemoteTransport,
    config: SyncConfig,
    observer: &'a dyn ProgressObserver,
    filter: Option<PathFilter>,
    resolution: Option<Resolution>,
    cancel: CancelToken,
    fresh: bool,
    phase: SyncPhase,
}

/// Result of one unit of execution, as seen by the orchestrator thread.
enum Finished {
    Ran(ActionOutcome),
    Skipped { path: RelPath, kind: ActionKind },
}

impl<'a> SyncSession<'a> {
    pub fn new(root: impl Into<PathBuf>, transport: &'a dyn RemoteTransport, config: SyncConfig) -> Self {
        Self {
            root: root.into(),
            transport,
            config,
            observer: &NullObserver,
            filter: None,
            resolution: None,
            cancel: CancelToken::new(),
            fresh: false,
            phase: SyncPhase::Idle,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Settle every conflict of the run the same way.
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Reconcile from an empty index instead of the stored manifest.
    ///
    /// The stored manifest is not read, so a corrupt one does not block the
    /// run. It is replaced only when the run reaches the commit phase.
    pub fn with_fresh_index(mut self) -> Self {
        self.fresh = true;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn enter(&mut self, phase: SyncPhase) {
        tracing::debug!("sync phase {} → {}", self.phase, phase);
        self.phase = phase;
    }

    fn fail(&mut self, err: SyncError) -> SyncError {
        tracing::warn!("sync of {} failed: {err}", self.root.display());
        self.enter(SyncPhase::Failed);
        err
    }

    /// Scan, reconcile and plan without executing anything (dry run).
    ///
    /// Conflicts are returned unresolved: resolving may copy files aside.
    pub fn preview(&self) -> Result<Plan, SyncError> {
        let index = self.load_index()?;
        let (local, remote) = self.scan(&index)?;
        Ok(plan(reconcile(&index, &local, &remote)))
    }

    fn load_index(&self) -> Result<Manifest, SyncError> {
        if self.fresh {
            tracing::info!("ignoring stored manifest of {}", self.root.display());
            return Ok(Manifest::new());
        }
        Ok(manifest::load_at(&self.root)?)
    }

    fn scan(&self, index: &Manifest) -> Result<(Snapshot, Snapshot), SyncError> {
        let (local, stats) = scan_local(&self.root, index, self.filter.as_ref())?;
        let remote = scan_remote(self.transport, self.filter.as_ref())?;
        tracing::info!(
            "scanned {} local entries ({} hashes reused) and {} remote entries",
            local.len(),
            stats.reused_hashes,
            remote.len()
        );
        Ok((local, remote))
    }

    /// Run the sync to completion.
    ///
    /// Returns `Err` only if the run could not start (scan failures, corrupt
    /// manifest) or the final manifest could not be written. Individual
    /// action failures are reported in the [`SyncReport`].
    pub fn run(&mut self) -> Result<SyncReport, SyncError> {
        let started_at = Utc::now();

        self.enter(SyncPhase::Scanning);
        let mut index = match self.load_index() {
            Ok(index) => index,
            Err(err) => return Err(self.fail(err)),
        };
        let (local, remote) = match self.scan(&index) {
            Ok(scanned) => scanned,
            Err(err) => return Err(self.fail(err)),
        };

        self.enter(SyncPhase::Reconciling);
        let mut outcomes = Vec::new();
        let actions = self.apply_resolution(reconcile(&index, &local, &remote), started_at, &mut outcomes);

        self.enter(SyncPhase::Planning);
        let plan = plan(actions);

        self.enter(SyncPhase::Executing);
        let executor = Executor::new(&self.root, self.transport, self.config.transfer, self.observer);
        let commit = self.config.commit;
        let root = self.root.clone();
        let mut absorb = |finished: Finished| {
            let (outcome, changed) = apply_outcome(&mut index, finished);
            outcomes.push(outcome);
            if changed && commit == CommitPolicy::EachAction {
                if let Err(err) = manifest::persist_at(&root, &index) {
                    tracing::warn!("could not persist manifest mid-run: {err}");
                }
            }
        };

        for action in &plan.bookkeeping {
            absorb(Finished::Ran(executor.execute(action)));
        }
        for stage in plan.stages() {
            match self.config.execution {
                ExecutionMode::Immediate => run_sequential(&executor, &stage, &self.cancel, &mut absorb),
                ExecutionMode::Pooled { .. } => run_pooled(
                    &executor,
                    &stage,
                    self.config.execution.workers(),
                    &self.cancel,
                    &mut absorb,
                ),
            }
        }
        for conflict in &plan.conflicts {
            outcomes.push(PathOutcome {
                path: conflict.path.clone(),
                kind: ActionKind::Conflict,
                status: OutcomeStatus::Conflicted,
            });
        }

        self.enter(SyncPhase::Committing);
        index.synced_at = Some(started_at);
        if let Err(err) = manifest::persist_at(&self.root, &index) {
            return Err(self.fail(err.into()));
        }

        outcomes.sort_by(|a, b| a.path.cmp(&b.path).then(a.kind.cmp(&b.kind)));
        let report = SyncReport {
            status: run_status(&outcomes, &self.cancel),
            started_at,
            outcomes,
            conflicts: plan.conflicts,
        };
        self.enter(SyncPhase::Done);
        tracing::info!(
            "sync of {} finished: {} synced, {} conflicted, {} failed, {} skipped",
            self.root.display(),
            report.count(&OutcomeStatus::Synced),
            report.count(&OutcomeStatus::Conflicted),
            report.count(&OutcomeStatus::Failed(String::new())),
            report.count(&OutcomeStatus::Skipped),
        );
        Ok(report)
    }

    /// Replace conflicts by resolved actions when a resolution was chosen.
    fn apply_resolution(
        &self,
        actions: Vec<Action>,
        at: DateTime<Utc>,
        outcomes: &mut Vec<PathOutcome>,
    ) -> Vec<Action> {
        let Some(resolution) = self.resolution else {
            return actions;
        };
        let mut resolved = Vec::with_capacity(actions.len());
        for action in actions {
            let conflict = match action {
                Action::Conflict(conflict) => conflict,
                other => {
                    resolved.push(other);
                    continue;
                }
            };
            match resolve(&self.root, &conflict, resolution, at) {
                Ok(replacement) => {
                    tracing::info!("resolved {} ({}) as {resolution}", conflict.path, conflict.kind);
                    resolved.extend(replacement);
                }
                Err(err) => {
                    tracing::warn!("could not resolve {}: {err}", conflict.path);
                    outcomes.push(PathOutcome {
                        path: conflict.path.clone(),
                        kind: ActionKind::Conflict,
                        status: OutcomeStatus::Failed(err.to_string()),
                    });
                }
            }
        }
        resolved
    }
}

// ---------------------------------------------------------------------------
// Execution modes
// ---------------------------------------------------------------------------

fn run_one(executor: &Executor<'_>, action: &Action, cancel: &CancelToken) -> Finished {
    if cancel.is_cancelled() {
        return Finished::Skipped {
            path: action.path().clone(),
            kind: action.kind(),
        };
    }
    Finished::Ran(executor.execute(action))
}

fn run_sequential(
    executor: &Executor<'_>,
    stage: &[Action],
    cancel: &CancelToken,
    absorb: &mut impl FnMut(Finished),
) {
    for action in stage {
        absorb(run_one(executor, action, cancel));
    }
}

/// Run one stage on up to `workers` scoped threads.
///
/// Steps within a stage touch unrelated paths, so they may complete in any
/// order. Outcomes are absorbed on the calling thread as they arrive.
fn run_pooled(
    executor: &Executor<'_>,
    stage: &[Action],
    workers: usize,
    cancel: &CancelToken,
    absorb: &mut impl FnMut(Finished),
) {
    let (job_tx, job_rx) = channel::unbounded::<&Action>();
    let (done_tx, done_rx) = channel::unbounded::<Finished>();
    for action in stage {
        // Both ends live in this frame; the send cannot fail.
        let _ = job_tx.send(action);
    }
    drop(job_tx);

    std::thread::scope(|scope| {
        for _ in 0..workers.min(stage.len()) {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            scope.spawn(move || {
                for action in job_rx.iter() {
                    if done_tx.send(run_one(executor, action, cancel)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(done_tx);
        for finished in done_rx.iter() {
            absorb(finished);
        }
    });
}

// ---------------------------------------------------------------------------
// Commit helpers
// ---------------------------------------------------------------------------

/// Fold one outcome into the index. The flag is `true` when the index
/// changed.
fn apply_outcome(index: &mut Manifest, finished: Finished) -> (PathOutcome, bool) {
    let ActionOutcome { path, kind, result } = match finished {
        Finished::Ran(outcome) => outcome,
        Finished::Skipped { path, kind } => {
            let outcome = PathOutcome {
                path,
                kind,
                status: OutcomeStatus::Skipped,
            };
            return (outcome, false);
        }
    };
    let (status, changed) = match result {
        Ok(IndexUpdate::Record(mut record)) => {
            record.relative_path = path.clone();
            let changed = index.get(&path) != Some(&record);
            index.record(path.clone(), record);
            (OutcomeStatus::Synced, changed)
        }
        Ok(IndexUpdate::Forget) => (OutcomeStatus::Synced, index.forget(&path).is_some()),
        Ok(IndexUpdate::Keep) => (OutcomeStatus::Synced, false),
        Err(err) => (OutcomeStatus::Failed(err.to_string()), false),
    };
    (PathOutcome { path, kind, status }, changed)
}

fn run_status(outcomes: &[PathOutcome], cancel: &CancelToken) -> RunStatus {
    if cancel.is_cancelled() && outcomes.iter().any(|o| o.status == OutcomeStatus::Skipped) {
        RunStatus::Cancelled
    } else if outcomes.iter().any(|o| matches!(o.status, OutcomeStatus::Failed(_))) {
        RunStatus::CompletedWithFailures
    } else {
        RunStatus::Completed
    }
}
