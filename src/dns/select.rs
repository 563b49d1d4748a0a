//! Capability probing and redirector construction.
//!
//! # Selection Priority
//!
//! With `dns.method = "auto"`:
//! 1. **dns-client** when `powershell` is on `PATH`
//! 2. **registry** on Windows
//! 3. Otherwise no mechanism is available

use std::sync::Arc;

use tracing::{debug, info};

use super::error::DnsRedirectError;
use super::registry::RegistryStore;
use super::strategy::{
    AdapterConfigRedirector, DnsClientRedirector, DnsRedirector, RegistryRedirector,
};
use crate::config::DnsMethod;
use crate::process::CommandRunner;

/// What this host can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `powershell` resolves on `PATH`.
    pub powershell: bool,
    /// The TCP/IP registry hive is reachable.
    pub registry: bool,
}

impl Capabilities {
    /// Probe the current host.
    pub fn detect() -> Self {
        let caps = Self {
            powershell: which::which("powershell").is_ok(),
            registry: cfg!(windows),
        };
        debug!(?caps, "Detected DNS redirection capabilities");
        caps
    }
}

/// Resolve `requested` against `caps`.
///
/// An explicit method is honoured only when the host supports it.
pub fn choose_method(
    requested: DnsMethod,
    caps: &Capabilities,
) -> Result<DnsMethod, DnsRedirectError> {
    let available = |method: DnsMethod| match method {
        DnsMethod::Auto => false,
        DnsMethod::Registry => caps.registry,
        DnsMethod::AdapterConfig => caps.powershell && caps.registry,
        DnsMethod::DnsClient => caps.powershell,
    };

    match requested {
        DnsMethod::Auto => [DnsMethod::DnsClient, DnsMethod::Registry]
            .into_iter()
            .find(|m| available(*m))
            .ok_or(DnsRedirectError::NoStrategyAvailable),
        explicit if available(explicit) => Ok(explicit),
        explicit => Err(DnsRedirectError::MethodUnavailable(explicit)),
    }
}

/// Build the redirector for a resolved method.
///
/// `registry` is required by the registry and adapter-config mechanisms.
pub fn build_redirector(
    method: DnsMethod,
    runner: Arc<dyn CommandRunner>,
    registry: Option<Arc<dyn RegistryStore>>,
) -> Result<Box<dyn DnsRedirector>, DnsRedirectError> {
    let need_registry = || registry.clone().ok_or(DnsRedirectError::MethodUnavailable(method));

    let redirector: Box<dyn DnsRedirector> = match method {
        DnsMethod::DnsClient => Box::new(DnsClientRedirector::new(runner)),
        DnsMethod::Registry => Box::new(RegistryRedirector::new(need_registry()?, runner)),
        DnsMethod::AdapterConfig => {
            Box::new(AdapterConfigRedirector::new(runner, need_registry()?))
        }
        DnsMethod::Auto => return Err(DnsRedirectError::NoStrategyAvailable),
    };
    info!("Using DNS redirection method: {}", method);
    Ok(redirector)
}

/// Probe the host and build the redirector for `requested`.
pub fn create_redirector(
    requested: DnsMethod,
    runner: Arc<dyn CommandRunner>,
) -> Result<Box<dyn DnsRedirector>, DnsRedirectError> {
    let method = choose_method(requested, &Capabilities::detect())?;
    build_redirector(method, runner, system_registry())
}

#[cfg(windows)]
fn system_registry() -> Option<Arc<dyn RegistryStore>> {
    Some(Arc::new(super::registry::LocalMachineRegistry))
}

#[cfg(not(windows))]
fn system_registry() -> Option<Arc<dyn RegistryStore>> {
    None
}
