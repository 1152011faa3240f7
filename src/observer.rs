//! Run observability
//!
//! Components report progress and every skip through a [`RunObserver`]
//! handed to them, instead of configuring logging themselves. The default
//! [`TracingObserver`] turns events into `tracing` records; tests use a
//! recording implementation.

use std::path::Path;

use crate::errors::{AppError, ConnectionError};
use crate::models::{ExportArtifactSet, TransportMode};

/// Receiver for pipeline events
pub trait RunObserver {
    fn connect_attempt(&self, _mode: TransportMode, _port: u16) {}

    fn connect_failed(&self, _mode: TransportMode, _port: u16, _error: &ConnectionError) {}

    fn folder_started(&self, _folder: &str, _candidates: usize) {}

    fn folder_skipped(&self, folder: &str, reason: &str);

    fn message_skipped(&self, folder: &str, uid: u32, reason: &str);

    fn artifact_failed(&self, folder: &str, uid: u32, error: &AppError);

    fn message_exported(&self, _folder: &str, _uid: u32, _artifacts: &ExportArtifactSet) {}
}

/// Observer that emits `tracing` events
///
/// In verbose mode the artifact paths of each exported message are reported
/// at info level; otherwise they are only visible at debug.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver {
    verbose: bool,
}

impl TracingObserver {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl RunObserver for TracingObserver {
    fn connect_attempt(&self, mode: TransportMode, port: u16) {
        tracing::debug!(%mode, port, "attempting IMAP connection");
    }

    fn connect_failed(&self, mode: TransportMode, port: u16, error: &ConnectionError) {
        tracing::warn!(%mode, port, error = %error, "connection attempt failed");
    }

    fn folder_started(&self, folder: &str, candidates: usize) {
        tracing::info!(folder, candidates, "searching folder");
    }

    fn folder_skipped(&self, folder: &str, reason: &str) {
        tracing::warn!(folder, reason, "skipping folder");
    }

    fn message_skipped(&self, folder: &str, uid: u32, reason: &str) {
        tracing::warn!(folder, uid, reason, "skipping message");
    }

    fn artifact_failed(&self, folder: &str, uid: u32, error: &AppError) {
        tracing::error!(folder, uid, error = %error, "artifact not written");
    }

    fn message_exported(&self, folder: &str, uid: u32, artifacts: &ExportArtifactSet) {
        let raw = display_path(artifacts.raw_message.as_deref());
        let text = display_path(artifacts.text.as_deref());
        let document = display_path(artifacts.document.as_deref());
        if self.verbose {
            tracing::info!(folder, uid, %raw, %text, %document, "exported message");
        } else {
            tracing::debug!(folder, uid, %raw, %text, %document, "exported message");
        }
    }
}

fn display_path(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_owned())
}

#[cfg(test)]
pub use recording::RecordingObserver;
