//! pathsync core library: domain types, manifest persistence, config, errors.
//!
//! Public API surface:
//! - [`types`] - [`RelPath`], [`PathRecord`], [`Snapshot`]
//! - [`manifest`] - [`Manifest`] plus atomic load / persist
//! - [`config`] - [`SyncConfig`] stored next to the manifest
//! - [`paths`] - on-disk layout of the `.pathsync/` state directory
//! - [`error`] - [`CoreError`]

pub mod config;
pub mod error;
pub mod manifest;
pub mod paths;
pub mod types;

pub use config::{CommitPolicy, ExecutionMode, SyncConfig, TransferConfig};
pub use error::CoreError;
pub use manifest::Manifest;
pub use types::{PathRecord, RelPath, Snapshot};
