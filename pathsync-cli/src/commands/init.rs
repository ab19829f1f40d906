//! `pathsync init --remote <dir> [--workers N]`

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;

use pathsync_core::{config, paths, ExecutionMode};
use pathsync_sync::DirRemote;

use super::project_root;

/// Bind the project root to a remote directory.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory that holds the remote copy. Created if missing.
    #[arg(long, value_name = "DIR")]
    pub remote: PathBuf,

    /// Run transfers on N worker threads instead of one at a time.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,
}

impl InitArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let root = project_root(root)?;
        let remote = DirRemote::create_project(&self.remote)
            .with_context(|| format!("failed to create remote '{}'", self.remote.display()))?;
        let remote_root = remote
            .root()
            .canonicalize()
            .with_context(|| format!("cannot resolve remote '{}'", self.remote.display()))?;
        if remote_root.starts_with(&root) || root.starts_with(&remote_root) {
            bail!(
                "remote '{}' and project root '{}' must not contain each other",
                remote_root.display(),
                root.display()
            );
        }

        let mut cfg = config::load_at(&root)
            .with_context(|| format!("failed to load config for '{}'", root.display()))?;
        cfg.remote = Some(remote_root.clone());
        if let Some(workers) = self.workers {
            cfg.execution = ExecutionMode::Pooled { workers };
        }
        config::save_at(&root, &cfg)
            .with_context(|| format!("failed to save config for '{}'", root.display()))?;

        println!("✓ Initialized '{}'", root.display());
        println!("  Remote: {}", remote_root.display());
        println!("  Saved to: {}", paths::config_path(&root).display());
        Ok(())
    }
}
