//! Hostname resolution for the DNS lookup probe.

use std::io;
use std::net::{IpAddr, ToSocketAddrs};

/// Resolves a hostname to addresses.
pub trait HostResolver: Send + Sync {
    /// All addresses for `host`, in resolver order.
    fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// [`HostResolver`] using the OS resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        Ok((host, 0u16).to_socket_addrs()?.map(|sa| sa.ip()).collect())
    }
}

/// Drop repeated addresses, keeping first occurrences in order.
pub fn dedup_in_order(addrs: Vec<IpAddr>) -> Vec<IpAddr> {
    let mut unique = Vec::with_capacity(addrs.len());
    for addr in addrs {
        if !unique.contains(&addr) {
            unique.push(addr);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_in_order() {
        let a: IpAddr = "192.0.2.1".parse().unwrap();
        let b: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(dedup_in_order(vec![b, a, b, a]), vec![b, a]);
    }

    #[test]
    fn test_system_resolver_literal() {
        let addrs = SystemResolver.resolve("127.0.0.1").unwrap();
        assert_eq!(addrs, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
    }
}
