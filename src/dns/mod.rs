//! DNS redirection.
//!
//! Points the DNS servers of every active wired and wireless adapter at the
//! loopback DNS proxy, and back. Three mechanisms implement
//! [`DnsRedirector`]:
//!
//! - **registry**: per-adapter `NameServer` values under the Tcpip/Tcpip6 keys
//! - **adapter-config**: `Win32_NetworkAdapterConfiguration.SetDNSServerSearchOrder`
//! - **dns-client**: `Set-DnsClientServerAddress` across all physical adapters
//!
//! [`create_redirector`] picks one from `dns.method`; callers only ever see
//! the trait object.
//!
//! # Example
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use redirect_setup::config::DnsMethod;
//! use redirect_setup::dns::{AdapterSource, SystemAdapters, create_redirector};
//! use redirect_setup::process::SystemRunner;
//!
//! let redirector = create_redirector(DnsMethod::Auto, Arc::new(SystemRunner::new()))?;
//! let adapters = SystemAdapters.active_adapters()?;
//! redirector.activate(&adapters, &["127.0.0.1".parse()?])?;
//! redirector.flush_cache()?;
//! # Ok(())
//! # }
//! ```

mod adapters;
mod error;
mod registry;
mod select;
mod strategy;

pub use adapters::{AdapterSource, NetworkAdapterRef, StaticAdapters, SystemAdapters};
pub use error::{AdapterError, AdapterFailure, DnsRedirectError, RegistryAccessError};
#[cfg(windows)]
pub use registry::LocalMachineRegistry;
pub use registry::{IpFamily, MemoryRegistry, NAME_SERVER_VALUE, RegistryStore, interface_key};
pub use select::{Capabilities, build_redirector, choose_method, create_redirector};
pub use strategy::{
    AdapterConfigRedirector, DnsClientRedirector, DnsRedirector, RegistryRedirector,
};
