//! Per-project sync configuration stored at `<root>/.pathsync/config.yaml`.
//!
//! Every field has a default, so a missing file and an empty file both load
//! as [`SyncConfig::default`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::manifest::write_atomic;
use crate::paths;

/// Payloads below this size are sent in a single request.
pub const DEFAULT_CHUNK_THRESHOLD: u64 = 4 * 1024 * 1024;
/// Segment size for chunked transfers.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// How plan steps are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One action at a time on the calling thread.
    #[default]
    Immediate,
    /// Up to `workers` actions at a time on scoped worker threads.
    Pooled { workers: usize },
}

impl ExecutionMode {
    /// Effective number of concurrent actions (never zero).
    pub fn workers(&self) -> usize {
        match self {
            ExecutionMode::Immediate => 1,
            ExecutionMode::Pooled { workers } => (*workers).max(1),
        }
    }
}

/// When the manifest is written during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Once, after every planned action has reported.
    #[default]
    AtEnd,
    /// After every applied outcome, so an interrupted run keeps its progress.
    EachAction,
}

/// Transfer sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_chunk_threshold")]
    pub chunk_threshold: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

fn default_chunk_threshold() -> u64 {
    DEFAULT_CHUNK_THRESHOLD
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncConfig {
    /// Location of the directory-backed remote store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<PathBuf>,
    #[serde(default)]
    pub execution: ExecutionMode,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub commit: CommitPolicy,
}

/// Load the config for the project rooted at `root`.
///
/// Returns defaults if the file does not exist, `CoreError::ConfigParse`
/// (with path + line context) if it is malformed.
pub fn load_at(root: &Path) -> Result<SyncConfig, CoreError> {
    let path = paths::config_path(root);
    if !path.exists() {
        return Ok(SyncConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(SyncConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| CoreError::ConfigParse { path, source })
}

/// Atomically save the config for the project rooted at `root`.
pub fn save_at(root: &Path, config: &SyncConfig) -> Result<(), CoreError> {
    let yaml = serde_yaml::to_string(config)?;
    write_atomic(&paths::config_path(root), yaml.as_bytes())
}
