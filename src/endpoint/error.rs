//! Endpoint probing and redirect map error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ProbeSource;
use crate::process::ProcessError;

/// Errors from upstream endpoint probing.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The latency tool exited non-zero.
    #[error("Latency tool failed (exit code {exit_code}): {stderr}")]
    ToolFailed {
        /// Exit code of the tool.
        exit_code: i32,
        /// Captured stderr.
        stderr: String,
    },

    /// The tool's result file could not be read or cleared.
    #[error("Failed to access latency result {path}: {source}")]
    ResultFile {
        /// Result file path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The result file does not have the expected CSV shape.
    #[error("Malformed latency result at line {line}: {reason}")]
    MalformedOutput {
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        reason: String,
    },

    /// Hostname resolution failed.
    #[error("Failed to resolve {host}: {source}")]
    Lookup {
        /// Hostname looked up.
        host: String,
        /// The underlying resolver error.
        source: std::io::Error,
    },

    /// The source produced no addresses.
    #[error("No upstream endpoint found using {probe}")]
    NoEndpointFound {
        /// Source that came back empty.
        probe: ProbeSource,
    },

    /// The latency tool could not be started.
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Errors from writing the redirect map.
#[derive(Debug, Error)]
pub enum RedirectMapError {
    /// Refused to write a map without any target entries.
    #[error("Refusing to write an empty redirect map")]
    EmptyMapping,

    /// A map file could not be written.
    #[error("Failed to write redirect map {path}: {source}")]
    Write {
        /// Map file path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
