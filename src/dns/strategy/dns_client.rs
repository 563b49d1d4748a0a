//! DnsClient cmdlet backend.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::info;

use super::{DnsRedirector, powershell};
use crate::config::DnsMethod;
use crate::dns::adapters::NetworkAdapterRef;
use crate::dns::error::DnsRedirectError;
use crate::process::{CommandRunner, Invocation};

const PHYSICAL_UP: &str =
    "$ErrorActionPreference = 'Stop'; Get-NetAdapter -Physical | Where-Object Status -eq 'Up'";

/// Uses the DnsClient cmdlets against every physical adapter at once.
///
/// Failures are whole-host; the adapter list is only used for logging.
pub struct DnsClientRedirector {
    runner: Arc<dyn CommandRunner>,
}

impl DnsClientRedirector {
    /// Create a redirector running cmdlets through `runner`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn run(&self, invocation: Invocation) -> Result<(), DnsRedirectError> {
        let output = self.runner.run(&invocation)?;
        if output.success() {
            Ok(())
        } else {
            Err(DnsRedirectError::HostCommand {
                exit_code: output.exit_code(),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

impl DnsRedirector for DnsClientRedirector {
    fn method(&self) -> DnsMethod {
        DnsMethod::DnsClient
    }

    fn activate(
        &self,
        adapters: &[NetworkAdapterRef],
        loopback: &[IpAddr],
    ) -> Result<(), DnsRedirectError> {
        let servers = loopback
            .iter()
            .map(|a| format!("'{a}'"))
            .collect::<Vec<_>>()
            .join(",");
        self.run(powershell(format!(
            "{PHYSICAL_UP} | Set-DnsClientServerAddress -ServerAddresses ({servers})"
        )))?;
        info!(
            "Redirected DNS on all physical adapters ({} enumerated)",
            adapters.len()
        );
        Ok(())
    }

    fn deactivate(&self, _adapters: &[NetworkAdapterRef]) -> Result<(), DnsRedirectError> {
        self.run(powershell(format!(
            "{PHYSICAL_UP} | Set-DnsClientServerAddress -ResetServerAddresses"
        )))
    }

    fn flush_cache(&self) -> Result<(), DnsRedirectError> {
        self.run(powershell("Clear-DnsClientCache"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ProcessError, ProcessOutput};
    use std::sync::Mutex;

    struct Recorder {
        scripts: Mutex<Vec<String>>,
        code: i32,
    }

    impl Recorder {
        fn new(code: i32) -> Self {
            Self {
                scripts: Mutex::default(),
                code,
            }
        }
    }

    impl CommandRunner for Recorder {
        fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
            assert!(invocation.program_is("powershell"));
            let script = invocation.args_lossy().last().cloned().unwrap_or_default();
            self.scripts.lock().unwrap().push(script);
            Ok(ProcessOutput {
                code: Some(self.code),
                stdout: String::new(),
                stderr: "Access is denied.".to_string(),
            })
        }
    }

    #[test]
    fn test_activate_single_call_with_all_servers() {
        let runner = Arc::new(Recorder::new(0));
        let redirector = DnsClientRedirector::new(runner.clone());

        redirector
            .activate(
                &[NetworkAdapterRef::from_id("{A}"), NetworkAdapterRef::from_id("{B}")],
                &["127.0.0.1".parse().unwrap(), "::1".parse().unwrap()],
            )
            .unwrap();

        let scripts = runner.scripts.lock().unwrap();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].contains("Get-NetAdapter -Physical"));
        assert!(scripts[0].contains("-ServerAddresses ('127.0.0.1','::1')"));
    }

    #[test]
    fn test_deactivate_resets_and_flush_clears_cache() {
        let runner = Arc::new(Recorder::new(0));
        let redirector = DnsClientRedirector::new(runner.clone());

        redirector.deactivate(&[]).unwrap();
        redirector.flush_cache().unwrap();

        let scripts = runner.scripts.lock().unwrap();
        assert!(scripts[0].ends_with("-ResetServerAddresses"));
        assert_eq!(scripts[1], "Clear-DnsClientCache");
    }

    #[test]
    fn test_failure_is_whole_host_error() {
        let redirector = DnsClientRedirector::new(Arc::new(Recorder::new(1)));

        let err = redirector
            .activate(&[], &["127.0.0.1".parse().unwrap()])
            .unwrap_err();

        assert!(matches!(
            err,
            DnsRedirectError::HostCommand { exit_code: 1, ref stderr } if stderr == "Access is denied."
        ));
    }
}
