//! Service supervisor error types.

use thiserror::Error;

use super::descriptor::LifecycleVerb;
use crate::process::ProcessError;

/// Errors raised while controlling a managed service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A control program exited non-zero.
    #[error("`{verb}` failed for service {service} (exit code {exit_code}): {stderr}")]
    Control {
        /// Verb that failed.
        verb: LifecycleVerb,
        /// Service name.
        service: String,
        /// Exit code of the control program.
        exit_code: i32,
        /// Captured stderr (stdout when stderr was empty).
        stderr: String,
    },

    /// The descriptor has no way to perform this verb.
    #[error("Service {service} does not support `{verb}`")]
    UnsupportedVerb {
        /// Requested verb.
        verb: LifecycleVerb,
        /// Service name.
        service: String,
    },

    /// The control program could not be started.
    #[error(transparent)]
    Process(#[from] ProcessError),
}
