//! Telemetry error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during telemetry operations.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to connect to syslog.
    #[error("Failed to connect to syslog: {0}")]
    SyslogConnection(String),

    /// The selected sink does not exist on this platform.
    #[error("Audit sink `{0}` is not available on this platform")]
    UnsupportedSink(String),

    /// Failed to open the audit log file.
    #[error("Failed to open audit log {path}: {source}")]
    OpenFile {
        /// Audit log path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to serialize event to JSON.
    #[error("Failed to serialize event: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Logger already initialized.
    #[error("Audit logger already initialized")]
    AlreadyInitialized,
}
