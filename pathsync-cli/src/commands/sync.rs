//! `pathsync sync`: run a one-shot three-way sync.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use pathsync_core::ExecutionMode;
use pathsync_sync::{ActionKind, LogObserver, OutcomeStatus, RunStatus, SyncReport, SyncSession};

use super::{open_project, project_root, status};
use crate::ResolutionArg;

/// Arguments for `pathsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Show what would be transferred without touching either side.
    #[arg(long)]
    pub dry_run: bool,

    /// Settle every conflict: keep the local version, the remote one, or both.
    #[arg(long, value_name = "local|remote|both")]
    pub resolve: Option<ResolutionArg>,

    /// Run transfers on N worker threads (overrides config).
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Discard the manifest and reconcile from scratch.
    #[arg(long, conflicts_with = "dry_run")]
    pub fresh: bool,
}

impl SyncArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let root = project_root(root)?;
        let (mut config, remote) = open_project(&root)?;
        if let Some(workers) = self.workers {
            config.execution = ExecutionMode::Pooled { workers };
        }

        if self.dry_run {
            let plan = SyncSession::new(&root, &remote, config)
                .preview()
                .context("failed to scan project")?;
            status::print_plan(&plan, "[dry-run] ");
            return Ok(());
        }

        let mut session = SyncSession::new(&root, &remote, config).with_observer(&LogObserver);
        if self.fresh {
            session = session.with_fresh_index();
        }
        if let Some(resolution) = self.resolve {
            session = session.with_resolution(resolution.into());
        }
        let report = session
            .run()
            .with_context(|| format!("sync failed for '{}'", root.display()))?;

        if self.fresh {
            println!("Manifest rebuilt; every path was reconciled from scratch.");
        }
        print_report(&root, &report);
        let failed = report.failures().count();
        if failed > 0 {
            bail!("{failed} action(s) failed; their paths were left un-synced");
        }
        Ok(())
    }
}

fn outcome_marker(kind: ActionKind, status: &OutcomeStatus) -> String {
    match status {
        OutcomeStatus::Failed(_) => "✗".red().bold().to_string(),
        OutcomeStatus::Conflicted => "!".yellow().bold().to_string(),
        OutcomeStatus::Skipped => "·".bright_black().to_string(),
        OutcomeStatus::Synced => match kind {
            ActionKind::Upload => "↑".green().to_string(),
            ActionKind::Download => "↓".cyan().to_string(),
            ActionKind::DeleteLocal | ActionKind::DeleteRemote => "−".red().to_string(),
            _ => "·".bright_black().to_string(),
        },
    }
}

fn print_report(root: &Path, report: &SyncReport) {
    let shown: Vec<_> = report.transfers().collect();
    let synced = shown
        .iter()
        .filter(|o| o.status == OutcomeStatus::Synced)
        .count();

    let headline = match report.status {
        RunStatus::Completed => "✓".green().bold(),
        RunStatus::CompletedWithFailures => "✗".red().bold(),
        RunStatus::Cancelled => "■".yellow().bold(),
    };
    if shown.is_empty() {
        println!("{headline} '{}' — nothing to do", root.display());
        return;
    }
    println!(
        "{headline} '{}' synced ({} done, {} conflicted, {} failed, {} skipped)",
        root.display(),
        synced,
        report.count(&OutcomeStatus::Conflicted),
        report.failures().count(),
        report.count(&OutcomeStatus::Skipped),
    );

    for outcome in shown {
        let marker = outcome_marker(outcome.kind, &outcome.status);
        match &outcome.status {
            OutcomeStatus::Failed(reason) => {
                println!("  {marker}  {} ({}): {reason}", outcome.path, outcome.kind)
            }
            OutcomeStatus::Conflicted => {
                let why = report
                    .conflicts
                    .iter()
                    .find(|c| c.path == outcome.path)
                    .map(|c| c.kind.to_string())
                    .unwrap_or_else(|| "conflict".to_string());
                println!("  {marker}  {} — {why}", outcome.path)
            }
            _ => println!("  {marker}  {} ({})", outcome.path, outcome.kind),
        }
    }

    if !report.conflicts.is_empty() {
        println!(
            "Inspect conflicts with 'pathsync diff <path>', then run 'pathsync sync --resolve local|remote|both'."
        );
    }
}
