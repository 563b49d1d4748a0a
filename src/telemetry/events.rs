//! Audit event types for structured logging.
//!
//! Every user-visible operation and every change to host state produces one
//! event, so an audit log alone is enough to tell what an install touched.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Audit events for host-state changes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A lifecycle operation began.
    OperationStarted {
        /// Which operation.
        operation: Operation,
        /// Username of the person running the installer.
        user: String,
        /// Process ID of the installer.
        pid: u32,
    },

    /// A lifecycle operation ended.
    OperationFinished {
        /// Which operation.
        operation: Operation,
        /// How it ended.
        outcome: Outcome,
        /// Error chain when the operation failed.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// An upstream endpoint was chosen for the redirect map.
    EndpointSelected {
        /// Chosen address.
        address: String,
        /// Probe source that produced it.
        source: String,
    },

    /// A managed service was registered and started.
    ServiceInstalled {
        /// Service name.
        service: String,
    },

    /// A managed service registration was removed.
    ServiceRemoved {
        /// Service name.
        service: String,
    },

    /// A CA certificate was added to the trusted root store.
    CaTrusted {
        /// SHA-1 thumbprint, uppercase hex.
        thumbprint: String,
        /// Subject common name.
        common_name: String,
    },

    /// A CA certificate was removed from the trusted root store.
    CaRemoved {
        /// SHA-1 thumbprint, uppercase hex.
        thumbprint: String,
    },

    /// A CA could not be removed and is still trusted.
    CaRemovalFailed {
        /// SHA-1 thumbprint, uppercase hex.
        thumbprint: String,
    },

    /// Adapter DNS servers were redirected to loopback or restored.
    DnsRedirected {
        /// Mechanism used.
        method: String,
        /// Adapter IDs touched.
        adapters: Vec<String>,
        /// `true` for activation, `false` for restore.
        active: bool,
    },

    /// A bookkeeping file could not be parsed and was left in place.
    CorruptBookkeeping {
        /// Offending file.
        path: String,
        /// Parse failure.
        reason: String,
    },
}

/// Lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Full install.
    Install,
    /// Endpoint re-probe.
    Refresh,
    /// Full removal.
    Uninstall,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Install => write!(f, "install"),
            Operation::Refresh => write!(f, "refresh"),
            Operation::Uninstall => write!(f, "uninstall"),
        }
    }
}

/// Result of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every step completed.
    Success,
    /// A step failed; the install record holds what was done.
    Failure,
}

/// Wrapper for serializing events with timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct TimestampedEvent<'a> {
    /// ISO8601 timestamp.
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,

    /// The actual event (flattened into this struct).
    #[serde(flatten)]
    pub event: &'a AuditEvent,
}

impl AuditEvent {
    /// Wrap this event with a timestamp for serialization.
    pub fn with_timestamp(&self) -> TimestampedEvent<'_> {
        TimestampedEvent {
            timestamp: Utc::now(),
            event: self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(event: &AuditEvent) -> String {
        serde_json::to_string(&event.with_timestamp()).unwrap()
    }

    #[test]
    fn test_operation_started_serialization() {
        let json = json(&AuditEvent::OperationStarted {
            operation: Operation::Install,
            user: "operator".to_string(),
            pid: 4242,
        });

        assert!(json.contains("\"event\":\"operation_started\""));
        assert!(json.contains("\"operation\":\"install\""));
        assert!(json.contains("\"pid\":4242"));
        assert!(json.contains("\"ts\""));
    }

    #[test]
    fn test_operation_finished_omits_missing_error() {
        let json = json(&AuditEvent::OperationFinished {
            operation: Operation::Refresh,
            outcome: Outcome::Success,
            error: None,
        });

        assert!(json.contains("\"outcome\":\"success\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_operation_finished_with_error() {
        let json = json(&AuditEvent::OperationFinished {
            operation: Operation::Uninstall,
            outcome: Outcome::Failure,
            error: Some("service control failed".to_string()),
        });

        assert!(json.contains("\"outcome\":\"failure\""));
        assert!(json.contains("\"error\":\"service control failed\""));
    }

    #[test]
    fn test_dns_redirected_serialization() {
        let json = json(&AuditEvent::DnsRedirected {
            method: "registry".to_string(),
            adapters: vec!["{A}".to_string(), "{B}".to_string()],
            active: true,
        });

        assert!(json.contains("\"event\":\"dns_redirected\""));
        assert!(json.contains("\"adapters\":[\"{A}\",\"{B}\"]"));
        assert!(json.contains("\"active\":true"));
    }

    #[test]
    fn test_ca_events_serialization() {
        let trusted = json(&AuditEvent::CaTrusted {
            thumbprint: "AB12".to_string(),
            common_name: "Test CA".to_string(),
        });
        let removed = json(&AuditEvent::CaRemoved {
            thumbprint: "AB12".to_string(),
        });
        let failed = json(&AuditEvent::CaRemovalFailed {
            thumbprint: "AB12".to_string(),
        });

        assert!(trusted.contains("\"event\":\"ca_trusted\""));
        assert!(removed.contains("\"event\":\"ca_removed\""));
        assert!(removed.contains("\"thumbprint\":\"AB12\""));
        assert!(failed.contains("\"event\":\"ca_removal_failed\""));
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::Install.to_string(), "install");
        assert_eq!(Operation::Refresh.to_string(), "refresh");
        assert_eq!(Operation::Uninstall.to_string(), "uninstall");
    }
}
