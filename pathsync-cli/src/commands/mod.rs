pub mod diff;
pub mod init;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use pathsync_core::{config, SyncConfig};
use pathsync_sync::DirRemote;

/// Resolve `--root` to an absolute, existing directory.
pub(crate) fn project_root(root: &Path) -> Result<PathBuf> {
    root.canonicalize()
        .with_context(|| format!("cannot resolve project root '{}'", root.display()))
}

/// Load the project config and bind its remote.
pub(crate) fn open_project(root: &Path) -> Result<(SyncConfig, DirRemote)> {
    let config = config::load_at(root)
        .with_context(|| format!("failed to load config for '{}'", root.display()))?;
    let remote = config.remote.clone().with_context(|| {
        format!(
            "no remote configured for '{}' — run `pathsync init --remote <dir>` first",
            root.display()
        )
    })?;
    Ok((config, DirRemote::new(remote)))
}
