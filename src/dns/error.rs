//! DNS redirection error types.

use thiserror::Error;

use crate::config::DnsMethod;
use crate::process::ProcessError;

/// A registry key or value could not be read or written.
#[derive(Debug, Error)]
#[error("Registry access failed for {key}: {source}")]
pub struct RegistryAccessError {
    /// Key path below HKEY_LOCAL_MACHINE.
    pub key: String,
    /// The underlying OS error.
    #[source]
    pub source: std::io::Error,
}

impl RegistryAccessError {
    /// Whether the key itself does not exist.
    pub fn is_missing_key(&self) -> bool {
        self.source.kind() == std::io::ErrorKind::NotFound
    }

    pub(crate) fn missing(key: &str) -> Self {
        Self {
            key: key.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "key not found"),
        }
    }
}

/// Why one adapter could not be redirected or restored.
#[derive(Debug, Error)]
pub enum AdapterFailure {
    /// Registry write failed.
    #[error(transparent)]
    Registry(#[from] RegistryAccessError),

    /// No adapter configuration object matches the adapter ID.
    #[error("no adapter configuration object matches")]
    NotFound,

    /// The adapter ID is not a GUID and cannot be passed to a query.
    #[error("adapter ID is not a GUID")]
    InvalidId,

    /// The adapter configuration call returned a failure code.
    #[error("configuration call failed (exit code {exit_code}): {stderr}")]
    Command {
        /// Exit code of the call.
        exit_code: i32,
        /// Captured stderr.
        stderr: String,
    },

    /// The configuration program could not be started.
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// One adapter's failure inside a partial result.
#[derive(Debug, Error)]
#[error("adapter {adapter}: {failure}")]
pub struct AdapterError {
    /// Adapter ID.
    pub adapter: String,
    /// What went wrong.
    #[source]
    pub failure: AdapterFailure,
}

/// Errors from DNS redirection.
#[derive(Debug, Error)]
pub enum DnsRedirectError {
    /// Some adapters failed; every adapter was still attempted.
    #[error("DNS redirection failed on {} of {total} adapters: {}", .failures.len(), join_failures(.failures))]
    Partial {
        /// Failures, in adapter order.
        failures: Vec<AdapterError>,
        /// Number of adapters attempted.
        total: usize,
    },

    /// A whole-host DNS client command failed.
    #[error("DNS client command failed (exit code {exit_code}): {stderr}")]
    HostCommand {
        /// Exit code of the command.
        exit_code: i32,
        /// Captured stderr.
        stderr: String,
    },

    /// Flushing the resolver cache failed.
    #[error("Failed to flush resolver cache (exit code {exit_code}): {stderr}")]
    FlushFailed {
        /// Exit code of the flush command.
        exit_code: i32,
        /// Captured stderr.
        stderr: String,
    },

    /// Active adapters could not be listed.
    #[error("Failed to enumerate network adapters: {0}")]
    AdapterEnumeration(String),

    /// Auto-selection found no usable mechanism.
    #[error("No DNS redirection mechanism is available on this host")]
    NoStrategyAvailable,

    /// The configured mechanism cannot run on this host.
    #[error("DNS method `{0}` is not available on this host")]
    MethodUnavailable(DnsMethod),

    /// A program could not be started.
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl DnsRedirectError {
    /// Turn collected per-adapter failures into a result.
    pub(crate) fn from_failures(failures: Vec<AdapterError>, total: usize) -> Result<(), Self> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Self::Partial { failures, total })
        }
    }
}

fn join_failures(failures: &[AdapterError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_message_lists_every_adapter() {
        let err = DnsRedirectError::from_failures(
            vec![
                AdapterError {
                    adapter: "{A}".to_string(),
                    failure: AdapterFailure::NotFound,
                },
                AdapterError {
                    adapter: "{B}".to_string(),
                    failure: RegistryAccessError::missing("Tcpip\\{B}").into(),
                },
            ],
            3,
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("2 of 3"));
        assert!(message.contains("{A}"));
        assert!(message.contains("{B}"));
    }

    #[test]
    fn test_no_failures_is_ok() {
        assert!(DnsRedirectError::from_failures(Vec::new(), 2).is_ok());
    }

    #[test]
    fn test_missing_key_detection() {
        assert!(RegistryAccessError::missing("k").is_missing_key());
        let denied = RegistryAccessError {
            key: "k".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!denied.is_missing_key());
    }
}
