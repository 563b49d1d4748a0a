//! Network adapter enumeration.

use std::fmt;

use super::error::DnsRedirectError;

/// One network adapter, identified by its OS-assigned GUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkAdapterRef {
    /// Stable adapter GUID, e.g. `{4D36E972-E325-11CE-BFC1-08002BE10318}`.
    pub id: String,
    /// Friendly name, only used for logs.
    pub name: String,
}

impl NetworkAdapterRef {
    /// Adapter known only by ID.
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
        }
    }
}

impl fmt::Display for NetworkAdapterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.id {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{} ({})", self.name, self.id)
        }
    }
}

/// Lists the adapters whose DNS settings are redirected.
pub trait AdapterSource: Send + Sync {
    /// Active wired and wireless adapters, enumerated fresh on each call.
    fn active_adapters(&self) -> Result<Vec<NetworkAdapterRef>, DnsRedirectError>;
}

/// Enumerates adapters through the OS adapter table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAdapters;

#[cfg(windows)]
impl AdapterSource for SystemAdapters {
    fn active_adapters(&self) -> Result<Vec<NetworkAdapterRef>, DnsRedirectError> {
        use ipconfig::{IfType, OperStatus};

        let adapters = ipconfig::get_adapters()
            .map_err(|e| DnsRedirectError::AdapterEnumeration(e.to_string()))?
            .into_iter()
            .filter(|a| matches!(a.if_type(), IfType::EthernetCsmacd | IfType::Ieee80211))
            .filter(|a| a.oper_status() == OperStatus::IfOperStatusUp)
            .map(|a| NetworkAdapterRef {
                id: a.adapter_name().to_string(),
                name: a.friendly_name().to_string(),
            })
            .collect::<Vec<_>>();

        tracing::debug!(?adapters, "Enumerated active adapters");
        Ok(adapters)
    }
}

#[cfg(not(windows))]
impl AdapterSource for SystemAdapters {
    fn active_adapters(&self) -> Result<Vec<NetworkAdapterRef>, DnsRedirectError> {
        Err(DnsRedirectError::AdapterEnumeration(
            "adapter enumeration is only supported on Windows; pin adapters with dns.adapters"
                .to_string(),
        ))
    }
}

/// A fixed adapter list, from `dns.adapters` or tests.
#[derive(Debug, Default, Clone)]
pub struct StaticAdapters {
    adapters: Vec<NetworkAdapterRef>,
}

impl StaticAdapters {
    /// Wrap an explicit adapter list.
    pub fn new(adapters: Vec<NetworkAdapterRef>) -> Self {
        Self { adapters }
    }

    /// Adapters known only by ID.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ids.into_iter().map(NetworkAdapterRef::from_id).collect())
    }
}

impl AdapterSource for StaticAdapters {
    fn active_adapters(&self) -> Result<Vec<NetworkAdapterRef>, DnsRedirectError> {
        Ok(self.adapters.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_adapters() {
        let source = StaticAdapters::from_ids(["{A}", "{B}"]);
        let adapters = source.active_adapters().unwrap();
        assert_eq!(adapters.len(), 2);
        assert_eq!(adapters[0].id, "{A}");
    }

    #[test]
    fn test_display() {
        assert_eq!(NetworkAdapterRef::from_id("{A}").to_string(), "{A}");
        let named = NetworkAdapterRef {
            id: "{A}".to_string(),
            name: "Wi-Fi".to_string(),
        };
        assert_eq!(named.to_string(), "Wi-Fi ({A})");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_system_adapters_unsupported_off_windows() {
        assert!(matches!(
            SystemAdapters.active_adapters(),
            Err(DnsRedirectError::AdapterEnumeration(_))
        ));
    }
}
