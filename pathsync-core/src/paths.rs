//! On-disk layout of per-project sync state.
//!
//! ```text
//! <root>/
//!   .pathsync/
//!     manifest.json   (last synced state - written atomically)
//!     config.yaml     (remote location, execution mode, transfer sizes)
//! ```

use std::path::{Path, PathBuf};

use crate::types::RelPath;

pub const STATE_DIR: &str = ".pathsync";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const CONFIG_FILE: &str = "config.yaml";

/// Suffix of in-flight download files written next to their target.
pub const TMP_SUFFIX: &str = ".pathsync.tmp";

/// Suffix of in-flight uploads staged next to their target on a directory remote.
pub const PART_SUFFIX: &str = ".pathsync.part";

pub fn state_dir(root: &Path) -> PathBuf {
    root.join(STATE_DIR)
}

pub fn manifest_path(root: &Path) -> PathBuf {
    state_dir(root).join(MANIFEST_FILE)
}

pub fn config_path(root: &Path) -> PathBuf {
    state_dir(root).join(CONFIG_FILE)
}

/// Sibling temp path used for atomic replacement of `path`.
pub fn tmp_sibling(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}{}", path.display(), TMP_SUFFIX))
}

/// Paths owned by pathsync itself; never scanned, never synced.
pub fn is_reserved(path: &RelPath) -> bool {
    let first = path.as_str().split('/').next().unwrap_or_default();
    first == STATE_DIR || path.as_str().ends_with(TMP_SUFFIX) || path.as_str().ends_with(PART_SUFFIX)
}
