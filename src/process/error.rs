//! Process invocation error types.

use thiserror::Error;

/// Errors raised while starting or waiting on an external program.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started (missing binary, permissions, ...).
    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        /// Command line that failed to start.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
