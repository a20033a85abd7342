//! The "message bus" collaborator (`spec.md` section 6): three severities,
//! printf-style payloads, plus percent-complete progress notifications for
//! long-running pipeline stages.

use std::fmt;

/// Severity of a message-bus notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Sink for pipeline progress and notifications. Long operations call
/// `progress` periodically and `notify` for one-off events; this is the only
/// collaborator through which the synchronous pipeline reports anything
/// before it returns.
pub trait ProgressSink {
    fn notify(&self, severity: Severity, message: &str);

    /// `percent` is 0..=100.
    fn progress(&self, percent: u8, message: &str);
}

/// Default sink: routes everything through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => tracing::info!("{message}"),
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Error => tracing::error!("{message}"),
        }
    }

    fn progress(&self, percent: u8, message: &str) {
        tracing::debug!(percent, "{message}");
    }
}

/// Sink that discards everything; used by tests and by callers that don't
/// want console/log noise.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn notify(&self, _severity: Severity, _message: &str) {}
    fn progress(&self, _percent: u8, _message: &str) {}
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}
