//! Per-adapter TCP/IP registry keys.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use super::error::RegistryAccessError;

/// Registry value holding an adapter's static DNS servers.
pub const NAME_SERVER_VALUE: &str = "NameServer";

const TCPIP_INTERFACES: &str = r"SYSTEM\CurrentControlSet\Services\Tcpip\Parameters\Interfaces";
const TCPIP6_INTERFACES: &str = r"SYSTEM\CurrentControlSet\Services\Tcpip6\Parameters\Interfaces";

/// IP address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    /// IPv4.
    V4,
    /// IPv6.
    V6,
}

impl IpFamily {
    /// Both families, v4 first.
    pub const ALL: [IpFamily; 2] = [IpFamily::V4, IpFamily::V6];

    /// Family of `addr`.
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => IpFamily::V4,
            IpAddr::V6(_) => IpFamily::V6,
        }
    }

    /// `addrs` of this family, comma-joined as the registry stores them.
    pub fn name_servers(self, addrs: &[IpAddr]) -> String {
        addrs
            .iter()
            .filter(|a| IpFamily::of(a) == self)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Interface key for `adapter_id` under HKEY_LOCAL_MACHINE.
pub fn interface_key(family: IpFamily, adapter_id: &str) -> String {
    let root = match family {
        IpFamily::V4 => TCPIP_INTERFACES,
        IpFamily::V6 => TCPIP6_INTERFACES,
    };
    format!(r"{root}\{adapter_id}")
}

/// String values under HKEY_LOCAL_MACHINE.
///
/// Keys are never created; writing to a missing key is an error whose
/// [`RegistryAccessError::is_missing_key`] is true.
pub trait RegistryStore: Send + Sync {
    /// Read a string value. `Ok(None)` when the key exists but the value does not.
    fn read_string(&self, key: &str, value: &str) -> Result<Option<String>, RegistryAccessError>;

    /// Write a string value into an existing key.
    fn write_string(&self, key: &str, value: &str, data: &str) -> Result<(), RegistryAccessError>;
}

/// [`RegistryStore`] backed by the live HKEY_LOCAL_MACHINE hive.
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalMachineRegistry;

#[cfg(windows)]
impl RegistryStore for LocalMachineRegistry {
    fn read_string(&self, key: &str, value: &str) -> Result<Option<String>, RegistryAccessError> {
        use winreg::RegKey;
        use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_READ};

        let access_err = |source| RegistryAccessError {
            key: key.to_string(),
            source,
        };
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let subkey = hklm
            .open_subkey_with_flags(key, KEY_READ)
            .map_err(access_err)?;
        match subkey.get_value::<String, _>(value) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(access_err(e)),
        }
    }

    fn write_string(&self, key: &str, value: &str, data: &str) -> Result<(), RegistryAccessError> {
        use winreg::RegKey;
        use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_SET_VALUE};

        let access_err = |source| RegistryAccessError {
            key: key.to_string(),
            source,
        };
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let subkey = hklm
            .open_subkey_with_flags(key, KEY_SET_VALUE)
            .map_err(access_err)?;
        subkey.set_value(value, &data).map_err(access_err)
    }
}

/// In-memory [`RegistryStore`] with explicitly created keys.
///
/// Key lookups are case-insensitive like the real registry.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    keys: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl MemoryRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a key if it does not exist.
    pub fn create_key(&self, key: &str) {
        if let Ok(mut keys) = self.keys.lock() {
            keys.entry(key.to_ascii_lowercase()).or_default();
        }
    }

    /// Create both interface keys for each adapter.
    pub fn with_adapters<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        let registry = Self::new();
        for id in ids {
            for family in IpFamily::ALL {
                registry.create_key(&interface_key(family, id));
            }
        }
        registry
    }
}

impl RegistryStore for MemoryRegistry {
    fn read_string(&self, key: &str, value: &str) -> Result<Option<String>, RegistryAccessError> {
        let keys = self.keys.lock().map_err(|_| poisoned(key))?;
        let values = keys
            .get(&key.to_ascii_lowercase())
            .ok_or_else(|| RegistryAccessError::missing(key))?;
        Ok(values.get(value).cloned())
    }

    fn write_string(&self, key: &str, value: &str, data: &str) -> Result<(), RegistryAccessError> {
        let mut keys = self.keys.lock().map_err(|_| poisoned(key))?;
        let values = keys
            .get_mut(&key.to_ascii_lowercase())
            .ok_or_else(|| RegistryAccessError::missing(key))?;
        values.insert(value.to_string(), data.to_string());
        Ok(())
    }
}

fn poisoned(key: &str) -> RegistryAccessError {
    RegistryAccessError {
        key: key.to_string(),
        source: std::io::Error::other("registry lock poisoned"),
    }
}
