//! pathsync: one-shot three-way sync between a folder and a remote project.
//!
//! # Usage
//!
//! ```text
//! pathsync init --remote <dir> [--workers N]
//! pathsync status [--json]
//! pathsync sync [--dry-run] [--resolve local|remote|both] [--workers N] [--fresh]
//! pathsync diff <path>
//! ```
//!
//! Every command accepts `--root <dir>` (default: current directory) and
//! `-v`/`-vv` for more log output.

mod commands;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{diff::DiffArgs, init::InitArgs, status::StatusArgs, sync::SyncArgs};
use pathsync_sync::Resolution;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "pathsync",
    version,
    about = "Synchronize a local folder with a remote project",
    long_about = None,
)]
struct Cli {
    /// Project root (the local side of the sync).
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Increase log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bind the project root to a remote directory.
    Init(InitArgs),

    /// Show what a sync would do, without doing it.
    Status(StatusArgs),

    /// Run a sync.
    Sync(SyncArgs),

    /// Show a unified diff between the local and remote content of a path.
    Diff(DiffArgs),
}

// ---------------------------------------------------------------------------
// Shared Resolution argument
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse a [`Resolution`] from CLI args.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionArg(pub Resolution);

impl FromStr for ResolutionArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self(Resolution::KeepLocal)),
            "remote" => Ok(Self(Resolution::KeepRemote)),
            "both" => Ok(Self(Resolution::KeepBoth)),
            other => Err(format!(
                "unknown resolution '{other}'; expected: local, remote, both"
            )),
        }
    }
}

impl fmt::Display for ResolutionArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<ResolutionArg> for Resolution {
    fn from(r: ResolutionArg) -> Self {
        r.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let root = cli.root;
    match cli.command {
        Commands::Init(args) => args.run(&root),
        Commands::Status(args) => args.run(&root),
        Commands::Sync(args) => args.run(&root),
        Commands::Diff(args) => args.run(&root),
    }
}
