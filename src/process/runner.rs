//! Blocking command runner.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::error::ProcessError;

/// A single external program call: program, arguments, working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to run (absolute path or a name looked up on `PATH`).
    pub program: PathBuf,
    /// Arguments, passed verbatim.
    pub args: Vec<OsString>,
    /// Working directory for the child, if it must differ from ours.
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    /// Start building an invocation of `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the child in `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Arguments as lossy UTF-8, mostly for fakes and assertions.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Whether the program's file name equals `name` (case-insensitive, `.exe` ignored).
    pub fn program_is(&self, name: &str) -> bool {
        program_stem(&self.program).eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

fn program_stem(program: &Path) -> &str {
    program
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ProcessOutput {
    /// Build an output with only an exit code.
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Default::default()
        }
    }

    /// True when the process exited with code 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code, using -1 for signal termination.
    pub fn exit_code(&self) -> i32 {
        self.code.unwrap_or(-1)
    }
}

/// Runs external programs to completion.
pub trait CommandRunner: Send + Sync {
    /// Start the program, wait for it to exit and return its output.
    ///
    /// A non-zero exit code is reported through [`ProcessOutput`], not as an error.
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError>;
}

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    /// Create a new system runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        debug!("Running: {}", invocation);

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(ref dir) = invocation.working_dir {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|e| ProcessError::Spawn {
            program: invocation.to_string(),
            source: e,
        })?;

        let result = ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!("`{}` exited with {:?}", invocation, result.code);
        Ok(result)
    }
}
