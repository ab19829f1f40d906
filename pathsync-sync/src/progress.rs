//! Progress and event notifications.
//!
//! Purely informational: observers never influence the outcome of an action.

use pathsync_core::RelPath;

/// Receives transfer progress and textual events. Called from worker threads.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, _path: &RelPath, _transferred: u64, _total: u64) {}

    fn on_event(&self, _message: &str) {}
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {}

/// Forwards notifications to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_progress(&self, path: &RelPath, transferred: u64, total: u64) {
        tracing::debug!("{path}: {transferred}/{total} bytes");
    }

    fn on_event(&self, message: &str) {
        tracing::info!("{message}");
    }
}
