//! Interchangeable DNS redirection mechanisms.

mod adapter_config;
mod dns_client;
mod registry_edit;

use std::net::IpAddr;

pub use adapter_config::AdapterConfigRedirector;
pub use dns_client::DnsClientRedirector;
pub use registry_edit::RegistryRedirector;

use super::adapters::NetworkAdapterRef;
use super::error::DnsRedirectError;
use crate::config::DnsMethod;
use crate::process::{CommandRunner, Invocation};

/// Points adapters' DNS servers at loopback and back.
///
/// `activate` and `deactivate` are idempotent. Per-adapter mechanisms try
/// every adapter and report the failures together as
/// [`DnsRedirectError::Partial`].
pub trait DnsRedirector: Send + Sync {
    /// Mechanism implemented by this redirector.
    fn method(&self) -> DnsMethod;

    /// Set the DNS servers of `adapters` to `loopback`.
    fn activate(
        &self,
        adapters: &[NetworkAdapterRef],
        loopback: &[IpAddr],
    ) -> Result<(), DnsRedirectError>;

    /// Clear the static DNS servers of `adapters`.
    fn deactivate(&self, adapters: &[NetworkAdapterRef]) -> Result<(), DnsRedirectError>;

    /// Drop the OS resolver cache.
    fn flush_cache(&self) -> Result<(), DnsRedirectError>;
}

/// `ipconfig /flushdns`.
pub(crate) fn flush_with_ipconfig(runner: &dyn CommandRunner) -> Result<(), DnsRedirectError> {
    let output = runner.run(&Invocation::new("ipconfig").arg("/flushdns"))?;
    if output.success() {
        Ok(())
    } else {
        Err(DnsRedirectError::FlushFailed {
            exit_code: output.exit_code(),
            stderr: output.stderr.trim().to_string(),
        })
    }
}

/// Non-interactive PowerShell running `script`.
pub(crate) fn powershell(script: impl Into<String>) -> Invocation {
    Invocation::new("powershell").args([
        "-NoProfile".to_string(),
        "-NonInteractive".to_string(),
        "-Command".to_string(),
        script.into(),
    ])
}
