//! Certificate installer error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::process::ProcessError;

/// Errors raised while generating, trusting or removing certificates.
#[derive(Debug, Error)]
pub enum CertError {
    /// Failed to generate a key pair.
    #[error("Failed to generate key pair: {0}")]
    KeyGeneration(String),

    /// Failed to build or sign a certificate.
    #[error("Failed to generate certificate: {0}")]
    CertGeneration(String),

    /// A leaf certificate needs at least one name.
    #[error("No patterns specified for the leaf certificate")]
    NoPatterns,

    /// A pattern cannot be encoded as a DNS subject alternative name.
    #[error("Pattern `{pattern}` is not a valid DNS name: {reason}")]
    InvalidSan {
        /// The rejected pattern.
        pattern: String,
        /// Why rcgen rejected it.
        reason: String,
    },

    /// Failed to write certificate material or a bookkeeping file.
    #[error("Failed to write {path:?}: {source}")]
    WriteFile {
        /// File being written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to list or remove bookkeeping files.
    #[error("Failed to access bookkeeping folder {path:?}: {source}")]
    Bookkeeping {
        /// File or folder involved.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A bookkeeping file is not a readable certificate.
    #[error("Corrupt bookkeeping file {path:?}: {reason}")]
    CorruptBookkeeping {
        /// The offending file; it is left in place.
        path: PathBuf,
        /// Read or parse failure.
        reason: String,
    },

    /// The trust store tool rejected an add or remove.
    #[error("Trust store {action} of {thumbprint} failed with exit code {exit_code}: {stderr}")]
    TrustStore {
        /// `add` or `remove`.
        action: &'static str,
        /// Certificate thumbprint.
        thumbprint: String,
        /// Tool exit code.
        exit_code: i32,
        /// Captured tool output.
        stderr: String,
    },

    /// The trust store tool could not be started.
    #[error(transparent)]
    Process(#[from] ProcessError),
}
