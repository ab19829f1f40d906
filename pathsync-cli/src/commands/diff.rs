//! `pathsync diff <path>`: compare local and remote content of one path.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use pathsync_core::RelPath;
use pathsync_sync::diff::{diff_path, PathDiff};

use super::{open_project, project_root};

/// Arguments for `pathsync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Path relative to the project root.
    pub path: String,
}

impl DiffArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let root = project_root(root)?;
        let (_config, remote) = open_project(&root)?;
        let path = RelPath::parse(&self.path)
            .with_context(|| format!("invalid project path '{}'", self.path))?;

        let diff = diff_path(&root, &remote, &path).with_context(|| format!("diff failed for '{path}'"))?;
        match diff {
            PathDiff::Identical => println!("No differences for '{path}'."),
            PathDiff::Text(unified) => {
                print!("{unified}");
                if !unified.ends_with('\n') {
                    println!();
                }
            }
            PathDiff::Binary { local, remote } => {
                println!("Binary content differs for '{path}'.");
                println!("  local:  {}", local.as_deref().unwrap_or("(absent)"));
                println!("  remote: {}", remote.as_deref().unwrap_or("(absent)"));
            }
        }
        Ok(())
    }
}
