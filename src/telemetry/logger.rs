//! Audit event sinks.
//!
//! Events go to a JSON-lines file in the install directory, to the local
//! syslog daemon with the `REDIRECT_SETUP` tag, or nowhere.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use tracing::{debug, error};

use super::error::TelemetryError;
use super::events::AuditEvent;
use crate::config::AuditSink;

/// Syslog tag for all audit events.
pub const SYSLOG_TAG: &str = "REDIRECT_SETUP";

/// Global audit logger instance.
static AUDIT_LOGGER: OnceLock<AuditLogger> = OnceLock::new();

/// Returned by [`audit`] before [`init_logger`] has run.
static NULL_LOGGER: AuditLogger = AuditLogger::new_null();

#[cfg(unix)]
type SyslogWriter = syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>;

enum Sink {
    Null,
    File(Mutex<File>),
    #[cfg(unix)]
    Syslog(Mutex<SyslogWriter>),
}

/// Audit logger that writes structured JSON events to the configured sink.
///
/// Uses interior mutability (Mutex) to allow logging from shared references,
/// which is necessary since the logger is stored in a global OnceLock.
pub struct AuditLogger {
    sink: Sink,
}

impl AuditLogger {
    /// Open an audit logger that appends JSON lines to `path`.
    ///
    /// The parent directory is created if needed.
    pub fn to_file(path: &Path) -> Result<Self, TelemetryError> {
        let open_err = |source| TelemetryError::OpenFile {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(open_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(open_err)?;

        debug!("Writing audit events to {:?}", path);
        Ok(Self {
            sink: Sink::File(Mutex::new(file)),
        })
    }

    /// Create a new audit logger connected to syslog.
    ///
    /// Uses Unix socket connection to local syslog daemon.
    #[cfg(unix)]
    pub fn to_syslog() -> Result<Self, TelemetryError> {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_USER,
            hostname: None,
            process: SYSLOG_TAG.to_string(),
            pid: std::process::id(),
        };

        let writer = syslog::unix(formatter)
            .map_err(|e| TelemetryError::SyslogConnection(e.to_string()))?;

        debug!("Connected to syslog with tag '{}'", SYSLOG_TAG);
        Ok(Self {
            sink: Sink::Syslog(Mutex::new(writer)),
        })
    }

    /// Syslog is not available on this platform.
    #[cfg(not(unix))]
    pub fn to_syslog() -> Result<Self, TelemetryError> {
        Err(TelemetryError::UnsupportedSink("syslog".to_string()))
    }

    /// Create a null audit logger that discards all events.
    pub const fn new_null() -> Self {
        Self { sink: Sink::Null }
    }

    /// Log an audit event.
    ///
    /// The event is serialized to JSON with an ISO8601 timestamp. Sink write
    /// failures are reported through `tracing` and never abort the caller.
    pub fn log(&self, event: AuditEvent) {
        if self.is_null() {
            return;
        }

        let json = match serde_json::to_string(&event.with_timestamp()) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        match self.sink {
            Sink::Null => {}
            Sink::File(ref file) => match file.lock() {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        error!("Failed to write audit log: {}", e);
                    }
                }
                Err(e) => error!("Failed to acquire audit file lock: {}", e),
            },
            #[cfg(unix)]
            Sink::Syslog(ref writer) => match writer.lock() {
                Ok(mut writer) => {
                    if let Err(e) = writer.info(&json) {
                        error!("Failed to write to syslog: {}", e);
                    }
                }
                Err(e) => error!("Failed to acquire syslog writer lock: {}", e),
            },
        }
        debug!("Logged audit event: {}", json);
    }

    /// Check if this is a null logger.
    pub fn is_null(&self) -> bool {
        matches!(self.sink, Sink::Null)
    }
}

/// Initialize the global audit logger for the configured sink.
///
/// `file` is only used by [`AuditSink::File`]. Returns an error if the sink
/// cannot be opened or if a logger is already installed.
pub fn init_logger(sink: AuditSink, file: &Path) -> Result<(), TelemetryError> {
    let logger = match sink {
        AuditSink::File => AuditLogger::to_file(file)?,
        AuditSink::Syslog => AuditLogger::to_syslog()?,
        AuditSink::None => AuditLogger::new_null(),
    };

    AUDIT_LOGGER
        .set(logger)
        .map_err(|_| TelemetryError::AlreadyInitialized)?;

    Ok(())
}

/// Get a reference to the global audit logger.
///
/// Falls back to a null logger when [`init_logger`] has not been called, so
/// library code and tests can log unconditionally.
pub fn audit() -> &'static AuditLogger {
    AUDIT_LOGGER.get().unwrap_or(&NULL_LOGGER)
}

/// Try to get a reference to the global audit logger.
///
/// Returns None if `init_logger()` was not called.
pub fn try_audit() -> Option<&'static AuditLogger> {
    AUDIT_LOGGER.get()
}
