//! Registry backend: writes `NameServer` under the per-interface Tcpip keys.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{DnsRedirector, flush_with_ipconfig};
use crate::config::DnsMethod;
use crate::dns::adapters::NetworkAdapterRef;
use crate::dns::error::{AdapterError, DnsRedirectError};
use crate::dns::registry::{IpFamily, NAME_SERVER_VALUE, RegistryStore, interface_key};
use crate::process::CommandRunner;

/// Writes `NameServer` under each adapter's Tcpip and Tcpip6 interface keys.
pub struct RegistryRedirector {
    registry: Arc<dyn RegistryStore>,
    runner: Arc<dyn CommandRunner>,
}

impl RegistryRedirector {
    /// Create a redirector over `registry`; `runner` is used for cache flushes.
    pub fn new(registry: Arc<dyn RegistryStore>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { registry, runner }
    }
}

impl DnsRedirector for RegistryRedirector {
    fn method(&self) -> DnsMethod {
        DnsMethod::Registry
    }

    fn activate(
        &self,
        adapters: &[NetworkAdapterRef],
        loopback: &[IpAddr],
    ) -> Result<(), DnsRedirectError> {
        let mut failures = Vec::new();
        for adapter in adapters {
            let mut first_error = None;
            for family in IpFamily::ALL {
                let servers = family.name_servers(loopback);
                if servers.is_empty() {
                    continue;
                }
                let key = interface_key(family, &adapter.id);
                match self.registry.write_string(&key, NAME_SERVER_VALUE, &servers) {
                    Ok(()) => debug!("{}: {:?} NameServer = {}", adapter, family, servers),
                    Err(e) => {
                        warn!("Failed to redirect {:?} DNS on {}: {}", family, adapter, e);
                        first_error.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = first_error {
                failures.push(AdapterError {
                    adapter: adapter.id.clone(),
                    failure: e.into(),
                });
            }
        }
        info!(
            "Redirected DNS on {} of {} adapters",
            adapters.len() - failures.len(),
            adapters.len()
        );
        DnsRedirectError::from_failures(failures, adapters.len())
    }

    fn deactivate(&self, adapters: &[NetworkAdapterRef]) -> Result<(), DnsRedirectError> {
        let mut failures = Vec::new();
        for adapter in adapters {
            let mut first_error = None;
            for family in IpFamily::ALL {
                let key = interface_key(family, &adapter.id);
                match self.registry.write_string(&key, NAME_SERVER_VALUE, "") {
                    Ok(()) => debug!("{}: {:?} NameServer cleared", adapter, family),
                    // Nothing to clear.
                    Err(e) if e.is_missing_key() => {
                        debug!("{}: no {:?} interface key", adapter, family)
                    }
                    Err(e) => {
                        warn!("Failed to restore {:?} DNS on {}: {}", family, adapter, e);
                        first_error.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = first_error {
                failures.push(AdapterError {
                    adapter: adapter.id.clone(),
                    failure: e.into(),
                });
            }
        }
        DnsRedirectError::from_failures(failures, adapters.len())
    }

    fn flush_cache(&self) -> Result<(), DnsRedirectError> {
        flush_with_ipconfig(self.runner.as_ref())
    }
}
