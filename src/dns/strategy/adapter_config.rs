//! Adapter-configuration backend: IPv4 through the CIM adapter configuration
//! object, IPv6 through the registry.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{DnsRedirector, flush_with_ipconfig, powershell};
use crate::config::DnsMethod;
use crate::dns::adapters::NetworkAdapterRef;
use crate::dns::error::{AdapterError, AdapterFailure, DnsRedirectError};
use crate::dns::registry::{IpFamily, NAME_SERVER_VALUE, RegistryStore, interface_key};
use crate::process::{CommandRunner, Invocation};

/// Exit code the CIM script uses when no configuration object matches.
const NOT_FOUND_EXIT: i32 = 3;

/// Calls `SetDNSServerSearchOrder` on the adapter's
/// `Win32_NetworkAdapterConfiguration` object for IPv4.
///
/// The configuration object only carries IPv4 servers, so IPv6 goes through
/// the Tcpip6 registry key.
pub struct AdapterConfigRedirector {
    runner: Arc<dyn CommandRunner>,
    registry: Arc<dyn RegistryStore>,
}

impl AdapterConfigRedirector {
    /// Create a redirector; `registry` handles the IPv6 side.
    pub fn new(runner: Arc<dyn CommandRunner>, registry: Arc<dyn RegistryStore>) -> Self {
        Self { runner, registry }
    }

    fn set_v4(&self, adapter: &NetworkAdapterRef, servers: &[IpAddr]) -> Result<(), AdapterFailure> {
        let invocation = set_search_order(&adapter.id, servers)?;
        let output = self.runner.run(&invocation)?;
        match output.code {
            Some(0) => Ok(()),
            Some(NOT_FOUND_EXIT) => Err(AdapterFailure::NotFound),
            _ => Err(AdapterFailure::Command {
                exit_code: output.exit_code(),
                stderr: output.stderr.trim().to_string(),
            }),
        }
    }

    fn set_v6(&self, adapter: &NetworkAdapterRef, servers: &str, clearing: bool) -> Result<(), AdapterFailure> {
        let key = interface_key(IpFamily::V6, &adapter.id);
        match self.registry.write_string(&key, NAME_SERVER_VALUE, servers) {
            Err(e) if clearing && e.is_missing_key() => Ok(()),
            other => Ok(other?),
        }
    }

    fn apply(&self, adapter: &NetworkAdapterRef, loopback: &[IpAddr]) -> Result<(), AdapterFailure> {
        let v4: Vec<IpAddr> = loopback.iter().filter(|a| a.is_ipv4()).copied().collect();
        let v6 = IpFamily::V6.name_servers(loopback);
        let clearing = loopback.is_empty();

        // Both halves are attempted; the first failure is reported.
        let v4_result = if clearing || !v4.is_empty() {
            self.set_v4(adapter, &v4)
        } else {
            Ok(())
        };
        let v6_result = if clearing || !v6.is_empty() {
            self.set_v6(adapter, &v6, clearing)
        } else {
            Ok(())
        };
        v4_result.and(v6_result)
    }

    fn apply_all(
        &self,
        adapters: &[NetworkAdapterRef],
        loopback: &[IpAddr],
    ) -> Result<(), DnsRedirectError> {
        let mut failures = Vec::new();
        for adapter in adapters {
            match self.apply(adapter, loopback) {
                Ok(()) => debug!("{}: DNS search order set to {:?}", adapter, loopback),
                Err(failure) => {
                    warn!("Failed to set DNS on {}: {}", adapter, failure);
                    failures.push(AdapterError {
                        adapter: adapter.id.clone(),
                        failure,
                    });
                }
            }
        }
        DnsRedirectError::from_failures(failures, adapters.len())
    }
}

impl DnsRedirector for AdapterConfigRedirector {
    fn method(&self) -> DnsMethod {
        DnsMethod::AdapterConfig
    }

    fn activate(
        &self,
        adapters: &[NetworkAdapterRef],
        loopback: &[IpAddr],
    ) -> Result<(), DnsRedirectError> {
        self.apply_all(adapters, loopback)?;
        info!("Redirected DNS on {} adapters", adapters.len());
        Ok(())
    }

    fn deactivate(&self, adapters: &[NetworkAdapterRef]) -> Result<(), DnsRedirectError> {
        self.apply_all(adapters, &[])
    }

    fn flush_cache(&self) -> Result<(), DnsRedirectError> {
        flush_with_ipconfig(self.runner.as_ref())
    }
}

/// PowerShell call that sets (or with no servers, clears) the IPv4 search
/// order of the adapter whose `SettingID` is `adapter_id`.
fn set_search_order(adapter_id: &str, servers: &[IpAddr]) -> Result<Invocation, AdapterFailure> {
    if !is_guid_like(adapter_id) {
        return Err(AdapterFailure::InvalidId);
    }
    let order = if servers.is_empty() {
        "$null".to_string()
    } else {
        let quoted = servers
            .iter()
            .map(|s| format!("'{s}'"))
            .collect::<Vec<_>>()
            .join(",");
        format!("[string[]]@({quoted})")
    };
    let script = format!(
        "$c = Get-CimInstance -ClassName Win32_NetworkAdapterConfiguration \
         -Filter \"SettingID='{adapter_id}'\"; \
         if (-not $c) {{ exit {NOT_FOUND_EXIT} }}; \
         $r = Invoke-CimMethod -InputObject $c -MethodName SetDNSServerSearchOrder \
         -Arguments @{{ DNSServerSearchOrder = {order} }}; \
         exit [int]$r.ReturnValue"
    );
    Ok(powershell(script))
}

fn is_guid_like(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_hexdigit() || matches!(c, '{' | '}' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::registry::MemoryRegistry;
    use crate::process::{ProcessError, ProcessOutput};
    use std::sync::Mutex;

    const A: &str = "{4D36E972-E325-11CE-BFC1-08002BE10318}";
    const B: &str = "{00000000-0000-0000-0000-00000000000B}";

    /// Pretends only adapter `A` has a configuration object.
    #[derive(Default)]
    struct CimRunner {
        scripts: Mutex<Vec<String>>,
    }

    impl CommandRunner for CimRunner {
        fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
            let script = invocation.args_lossy().last().cloned().unwrap_or_default();
            self.scripts.lock().unwrap().push(script.clone());
            if invocation.program_is("ipconfig") || script.contains(A) {
                Ok(ProcessOutput::with_code(0))
            } else {
                Ok(ProcessOutput::with_code(NOT_FOUND_EXIT))
            }
        }
    }

    fn loopback() -> Vec<IpAddr> {
        vec!["127.0.0.1".parse().unwrap(), "::1".parse().unwrap()]
    }

    #[test]
    fn test_activate_sets_v4_via_cim_and_v6_via_registry() {
        let runner = Arc::new(CimRunner::default());
        let registry = Arc::new(MemoryRegistry::with_adapters([A]));
        let redirector = AdapterConfigRedirector::new(runner.clone(), registry.clone());

        redirector
            .activate(&[NetworkAdapterRef::from_id(A)], &loopback())
            .unwrap();

        let scripts = runner.scripts.lock().unwrap();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].contains("SetDNSServerSearchOrder"));
        assert!(scripts[0].contains("@('127.0.0.1')"));
        assert!(!scripts[0].contains("::1"));
        assert_eq!(
            registry
                .read_string(&interface_key(IpFamily::V6, A), NAME_SERVER_VALUE)
                .unwrap()
                .as_deref(),
            Some("::1")
        );
    }

    #[test]
    fn test_unmatched_adapter_is_not_found_and_others_continue() {
        let runner = Arc::new(CimRunner::default());
        let registry = Arc::new(MemoryRegistry::with_adapters([A, B]));
        let redirector = AdapterConfigRedirector::new(runner.clone(), registry);

        let err = redirector
            .activate(
                &[NetworkAdapterRef::from_id(B), NetworkAdapterRef::from_id(A)],
                &loopback(),
            )
            .unwrap_err();

        match err {
            DnsRedirectError::Partial { failures, total } => {
                assert_eq!(total, 2);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].adapter, B);
                assert!(matches!(failures[0].failure, AdapterFailure::NotFound));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(runner.scripts.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_deactivate_clears_with_null_and_tolerates_missing_v6_key() {
        let runner = Arc::new(CimRunner::default());
        let redirector =
            AdapterConfigRedirector::new(runner.clone(), Arc::new(MemoryRegistry::new()));

        redirector
            .deactivate(&[NetworkAdapterRef::from_id(A)])
            .unwrap();

        let scripts = runner.scripts.lock().unwrap();
        assert!(scripts[0].contains("DNSServerSearchOrder = $null"));
    }

    #[test]
    fn test_rejects_non_guid_ids() {
        assert!(matches!(
            set_search_order("x'; Remove-Item C:\\", &[]),
            Err(AdapterFailure::InvalidId)
        ));
        assert!(set_search_order(A, &[]).is_ok());
    }
}
