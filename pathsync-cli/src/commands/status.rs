//! `pathsync status`: what the next sync would do.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use pathsync_core::{manifest, PathRecord};
use pathsync_sync::{Action, ActionKind, Plan, SyncSession};

use super::{open_project, project_root};

/// Arguments for `pathsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let root = project_root(root)?;
        let (config, remote) = open_project(&root)?;
        let last_sync = manifest::load_at(&root)
            .with_context(|| format!("failed to load manifest for '{}'", root.display()))?
            .synced_at;
        let plan = SyncSession::new(&root, &remote, config)
            .preview()
            .context("failed to scan project")?;

        if self.json {
            return print_json(&root, remote.root(), last_sync, &plan);
        }
        println!(
            "pathsync v{} | {} ⇄ {} | last sync {}",
            env!("CARGO_PKG_VERSION"),
            root.display(),
            remote.root().display(),
            last_sync.map_or_else(|| "never".to_string(), format_age),
        );
        print_plan(&plan, "");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Plan rows (shared with `sync --dry-run`)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Tabled)]
pub(crate) struct PlanRow {
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "detail")]
    detail: String,
}

#[derive(Serialize)]
struct StatusJson<'a> {
    root: String,
    remote: String,
    last_sync: Option<String>,
    summary: BTreeMap<String, usize>,
    actions: &'a [PlanRow],
}

/// Everything in the plan except paths that are already in sync.
pub(crate) fn plan_rows(plan: &Plan) -> Vec<PlanRow> {
    let mut rows: Vec<PlanRow> = plan
        .steps
        .iter()
        .chain(plan.bookkeeping.iter().filter(|a| a.kind() != ActionKind::NoOp))
        .map(|action| PlanRow {
            path: action.path().to_string(),
            action: action.kind().to_string(),
            detail: action_detail(action),
        })
        .collect();
    rows.extend(plan.conflicts.iter().map(|conflict| PlanRow {
        path: conflict.path.to_string(),
        action: ActionKind::Conflict.to_string(),
        detail: conflict.kind.to_string(),
    }));
    rows
}

fn action_detail(action: &Action) -> String {
    match action {
        Action::Upload { local, .. } => describe_record(local),
        Action::Download { remote, .. } => describe_record(remote),
        Action::DeleteLocal { .. } => "deleted remotely".to_string(),
        Action::DeleteRemote { .. } => "deleted locally".to_string(),
        Action::RemoveFromIndex { .. } => "gone on both sides".to_string(),
        Action::Conflict(conflict) => conflict.kind.to_string(),
        Action::NoOp { .. } => "in sync".to_string(),
    }
}

fn describe_record(record: &PathRecord) -> String {
    if record.is_directory {
        "folder".to_string()
    } else {
        format_size(record.size)
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn format_age(at: DateTime<Utc>) -> String {
    let secs = (Utc::now() - at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

fn summary_line(plan: &Plan) -> String {
    let counts = plan.counts();
    let count = |kind: ActionKind| counts.get(&kind).copied().unwrap_or(0);
    format!(
        "{} upload  {} download  {} delete  {} conflict",
        count(ActionKind::Upload).to_string().green().bold(),
        count(ActionKind::Download).to_string().cyan().bold(),
        (count(ActionKind::DeleteLocal) + count(ActionKind::DeleteRemote))
            .to_string()
            .red()
            .bold(),
        count(ActionKind::Conflict).to_string().yellow().bold(),
    )
}

pub(crate) fn print_plan(plan: &Plan, prefix: &str) {
    let rows = plan_rows(plan);
    if rows.is_empty() {
        println!("{prefix}✓ Up to date — nothing to sync");
        return;
    }
    println!("{prefix}{}", summary_line(plan));
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    if !plan.conflicts.is_empty() {
        println!(
            "Inspect conflicts with 'pathsync diff <path>', then run 'pathsync sync --resolve local|remote|both'."
        );
    }
}

fn print_json(root: &Path, remote: &Path, last_sync: Option<DateTime<Utc>>, plan: &Plan) -> Result<()> {
    let rows = plan_rows(plan);
    let payload = StatusJson {
        root: root.display().to_string(),
        remote: remote.display().to_string(),
        last_sync: last_sync.map(|at| at.to_rfc3339()),
        summary: plan
            .counts()
            .into_iter()
            .filter(|(kind, _)| *kind != ActionKind::NoOp)
            .map(|(kind, n)| (kind.to_string(), n))
            .collect(),
        actions: &rows,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(12), "12 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn ages_round_down_to_the_largest_unit() {
        assert_eq!(format_age(Utc::now() - chrono::Duration::seconds(90)), "1m ago");
        assert_eq!(format_age(Utc::now() - chrono::Duration::hours(5)), "5h ago");
        assert_eq!(format_age(Utc::now() - chrono::Duration::days(3)), "3d ago");
    }
}
