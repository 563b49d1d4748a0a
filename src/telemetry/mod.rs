//! Telemetry and audit logging for redirect-setup.
//!
//! Audit events record every change the installer makes to the host. They go
//! to a JSON-lines file next to the install record by default, or to syslog
//! with the `REDIRECT_SETUP` tag.
//!
//! # Architecture
//!
//! - **Audit logging** (file/syslog): host-state changes, machine readable
//! - **Debug logging** (tracing): development logs go to stderr via `tracing`
//!
//! # Usage
//!
//! ```no_run
//! use redirect_setup::config::AuditSink;
//! use redirect_setup::telemetry::{self, AuditEvent};
//!
//! telemetry::init_logger(AuditSink::File, std::path::Path::new("audit.log"))?;
//!
//! telemetry::audit().log(AuditEvent::ServiceInstalled {
//!     service: "redirect-proxy".to_string(),
//! });
//! # Ok::<(), telemetry::TelemetryError>(())
//! ```
//!
//! # Event Format
//!
//! ```json
//! {"ts":"2026-01-07T14:32:01Z","event":"ca_trusted","thumbprint":"3F1A...","common_name":"Redirect Setup CA Root"}
//! ```

mod error;
mod events;
mod logger;

pub use error::TelemetryError;
pub use events::{AuditEvent, Operation, Outcome, TimestampedEvent};
pub use logger::{AuditLogger, SYSLOG_TAG, audit, init_logger, try_audit};
