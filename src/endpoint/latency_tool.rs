//! External latency tool runner and CSV result parser.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::error::ProbeError;
use crate::config::{InstallLayout, ProbeConfig};
use crate::process::{CommandRunner, Invocation};

/// Placeholder replaced by the result file path.
pub const OUTPUT_PLACEHOLDER: &str = "${OUTPUT}";
/// Placeholder replaced by the comma-joined target patterns.
pub const TARGET_PLACEHOLDER: &str = "${TARGET}";

/// Configured latency tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyTool {
    /// Tool executable.
    pub executable: PathBuf,
    /// Argument templates.
    pub args: Vec<String>,
    /// CSV file the tool writes.
    pub result_file: PathBuf,
}

impl LatencyTool {
    /// Tool settings from `[probe]`, resolved against the layout.
    pub fn from_config(config: &ProbeConfig, layout: &InstallLayout) -> Self {
        Self {
            executable: layout.latency_tool.clone(),
            args: config.tool_args.clone(),
            result_file: layout.latency_result.clone(),
        }
    }

    /// Command line with placeholders expanded. Runs in the tool's directory.
    pub fn invocation(&self, target: &str) -> Invocation {
        let output = self.result_file.to_string_lossy();
        let args = self.args.iter().map(|arg| {
            arg.replace(OUTPUT_PLACEHOLDER, &output)
                .replace(TARGET_PLACEHOLDER, target)
        });
        let invocation = Invocation::new(&self.executable).args(args);
        match self.executable.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => invocation.current_dir(dir),
            _ => invocation,
        }
    }

    /// Run the tool to completion and return its best-ranked address.
    ///
    /// Any previous result file is removed first so a failed run can never
    /// be mistaken for a fresh one.
    pub fn run(&self, runner: &dyn CommandRunner, target: &str) -> Result<Option<IpAddr>, ProbeError> {
        remove_stale(&self.result_file)?;
        if let Some(dir) = self.result_file.parent() {
            fs::create_dir_all(dir).map_err(|e| ProbeError::ResultFile {
                path: self.result_file.clone(),
                source: e,
            })?;
        }

        let invocation = self.invocation(target);
        info!("Running latency tool: {}", invocation);
        let output = runner.run(&invocation)?;
        if !output.success() {
            return Err(ProbeError::ToolFailed {
                exit_code: output.exit_code(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        let contents = fs::read_to_string(&self.result_file).map_err(|e| ProbeError::ResultFile {
            path: self.result_file.clone(),
            source: e,
        })?;
        let best = parse_result(&contents)?;
        debug!("Latency tool best candidate: {:?}", best);
        Ok(best)
    }
}

fn remove_stale(path: &Path) -> Result<(), ProbeError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed stale latency result {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProbeError::ResultFile {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Parse the tool's CSV result: a required header, then rows ranked best
/// first. Only the first data row is considered.
///
/// Returns `Ok(None)` when there is a header but no data row.
pub fn parse_result(contents: &str) -> Result<Option<IpAddr>, ProbeError> {
    let mut lines = contents.lines().enumerate();

    match lines.next() {
        Some((_, header)) if !header.trim_start_matches('\u{feff}').trim().is_empty() => {}
        _ => {
            return Err(ProbeError::MalformedOutput {
                line: 1,
                reason: "missing header row".to_string(),
            });
        }
    }

    let Some((index, row)) = lines.find(|(_, line)| !line.trim().is_empty()) else {
        return Ok(None);
    };

    let field = row.split(',').next().unwrap_or_default().trim();
    field
        .parse::<IpAddr>()
        .map(Some)
        .map_err(|e| ProbeError::MalformedOutput {
            line: index + 1,
            reason: format!("`{field}` is not an IP address: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ProcessError, ProcessOutput};
    use std::sync::Mutex;
    use tempfile::tempdir;

    const RESULT: &str = "IP Address,Sent,Received,Loss,Avg Latency,Download Speed (MB/s)\n\
                          198.51.100.4,4,4,0.00,180.50,0.00\n\
                          198.51.100.7,4,4,0.00,95.10,0.00\n";

    /// Writes `contents` to the result file when run, mimicking the tool.
    struct FakeTool {
        result_file: PathBuf,
        contents: Option<String>,
        code: i32,
        seen: Mutex<Vec<Invocation>>,
    }

    impl CommandRunner for FakeTool {
        fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
            self.seen.lock().unwrap().push(invocation.clone());
            if let Some(ref contents) = self.contents {
                fs::write(&self.result_file, contents).unwrap();
            }
            Ok(ProcessOutput::with_code(self.code))
        }
    }

    fn tool_in(dir: &Path) -> LatencyTool {
        LatencyTool {
            executable: dir.join("CloudflareST").join("CloudflareST.exe"),
            args: vec![
                "-o".to_string(),
                OUTPUT_PLACEHOLDER.to_string(),
                "-host".to_string(),
                TARGET_PLACEHOLDER.to_string(),
            ],
            result_file: dir.join("result.csv"),
        }
    }

    #[test]
    fn test_first_data_row_wins_even_if_slower() {
        let best = parse_result(RESULT).unwrap();
        assert_eq!(best, Some("198.51.100.4".parse().unwrap()));
    }

    #[test]
    fn test_header_only_is_none() {
        assert_eq!(parse_result("IP,Latency\n\n").unwrap(), None);
    }

    #[test]
    fn test_missing_header_is_malformed() {
        assert!(matches!(
            parse_result(""),
            Err(ProbeError::MalformedOutput { line: 1, .. })
        ));
    }

    #[test]
    fn test_bad_first_field_is_malformed() {
        let err = parse_result("IP,Latency\n\nnot-an-ip,12\n").unwrap_err();
        assert!(matches!(err, ProbeError::MalformedOutput { line: 3, .. }));
    }

    #[test]
    fn test_bom_header_and_ipv6_row() {
        let best = parse_result("\u{feff}IP,Latency\r\n2001:db8::1,10\r\n").unwrap();
        assert_eq!(best, Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_placeholders_expanded() {
        let dir = tempdir().unwrap();
        let tool = tool_in(dir.path());

        let inv = tool.invocation("*.example.test");

        let args = inv.args_lossy();
        assert_eq!(args[1], dir.path().join("result.csv").to_string_lossy());
        assert_eq!(args[3], "*.example.test");
        assert_eq!(inv.working_dir, Some(dir.path().join("CloudflareST")));
    }

    #[test]
    fn test_run_removes_stale_result_before_tool() {
        let dir = tempdir().unwrap();
        let tool = tool_in(dir.path());
        fs::write(&tool.result_file, RESULT).unwrap();

        // Tool exits 0 without writing anything: the stale file must be gone.
        let fake = FakeTool {
            result_file: tool.result_file.clone(),
            contents: None,
            code: 0,
            seen: Mutex::default(),
        };
        let err = tool.run(&fake, "t").unwrap_err();

        assert!(matches!(err, ProbeError::ResultFile { .. }));
    }

    #[test]
    fn test_run_creates_missing_result_directory() {
        let dir = tempdir().unwrap();
        let mut tool = tool_in(dir.path());
        tool.result_file = dir.path().join("results").join("latest").join("result.csv");
        let fake = FakeTool {
            result_file: tool.result_file.clone(),
            contents: Some(RESULT.to_string()),
            code: 0,
            seen: Mutex::default(),
        };

        let best = tool.run(&fake, "t").unwrap();

        assert_eq!(best, Some("198.51.100.4".parse().unwrap()));
        assert!(tool.result_file.exists());
    }

    #[test]
    fn test_run_nonzero_exit_is_tool_failed() {
        let dir = tempdir().unwrap();
        let tool = tool_in(dir.path());
        let fake = FakeTool {
            result_file: tool.result_file.clone(),
            contents: Some(RESULT.to_string()),
            code: 2,
            seen: Mutex::default(),
        };

        assert!(matches!(
            tool.run(&fake, "t"),
            Err(ProbeError::ToolFailed { exit_code: 2, .. })
        ));
    }

    #[test]
    fn test_run_returns_best_row() {
        let dir = tempdir().unwrap();
        let tool = tool_in(dir.path());
        let fake = FakeTool {
            result_file: tool.result_file.clone(),
            contents: Some(RESULT.to_string()),
            code: 0,
            seen: Mutex::default(),
        };

        let best = tool.run(&fake, "t").unwrap();

        assert_eq!(best, Some("198.51.100.4".parse().unwrap()));
        assert_eq!(fake.seen.lock().unwrap().len(), 1);
    }
}
