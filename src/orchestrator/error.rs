//! Orchestrator error types.

use std::path::PathBuf;

use thiserror::Error;

use super::record::InstallState;
use crate::certs::CertError;
use crate::config::ConfigError;
use crate::dns::DnsRedirectError;
use crate::endpoint::{ProbeError, RedirectMapError};
use crate::service::ServiceError;
use crate::telemetry::Operation;

/// Errors reading or writing the install record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The record exists but could not be read.
    #[error("Failed to read install record {path:?}: {source}")]
    Read {
        /// Record file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The record is not valid TOML for this version.
    #[error("Failed to parse install record {path:?}: {source}")]
    Parse {
        /// Record file.
        path: PathBuf,
        /// The parse error.
        #[source]
        source: toml::de::Error,
    },

    /// The record could not be serialized.
    #[error("Failed to serialize install record: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The record could not be written.
    #[error("Failed to write install record {path:?}: {source}")]
    Write {
        /// Record file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a lifecycle operation.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The operation is not allowed from the recorded state.
    #[error("Cannot {operation} while {state}")]
    InvalidTransition {
        /// Requested operation.
        operation: Operation,
        /// Recorded state.
        state: InstallState,
    },

    /// Configuration could not be turned into components.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Endpoint probing failed.
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// The redirect map could not be written.
    #[error(transparent)]
    RedirectMap(#[from] RedirectMapError),

    /// Certificate generation or trust store access failed.
    #[error(transparent)]
    Cert(#[from] CertError),

    /// A service control call failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// DNS redirection failed.
    #[error(transparent)]
    Dns(#[from] DnsRedirectError),

    /// The install record could not be read or written.
    #[error(transparent)]
    Record(#[from] RecordError),
}
