//! External process invocation.
//!
//! Every companion program (service helper, DNS proxy control, latency tool,
//! `certutil`, `powershell`, `ipconfig`) is started through the
//! [`CommandRunner`] trait. The runner blocks until the child exits and hands
//! back its exit code and captured output; turning a non-zero exit into a
//! typed failure is the caller's job, since only the caller knows what the
//! exit code means.
//!
//! # Example
//!
//! ```no_run
//! use redirect_setup::process::{CommandRunner, Invocation, SystemRunner};
//!
//! let runner = SystemRunner::new();
//! let output = runner.run(&Invocation::new("ipconfig").arg("/flushdns"))?;
//! assert!(output.success());
//! # Ok::<(), redirect_setup::process::ProcessError>(())
//! ```

mod error;
mod runner;

pub use error::ProcessError;
pub use runner::{CommandRunner, Invocation, ProcessOutput, SystemRunner};
