//! Geo resolution, minimal interface.
//!
//! Production would resolve client IP to a country via a MaxMind-style
//! database; that lookup is out of scope here, so this is a trait with a
//! null implementation (always unresolved, so geo-restricted line-items
//! never match) and a static-map implementation useful for tests and for
//! deployments that terminate TLS behind a geo-aware load balancer that
//! already stamps a country header.

use std::collections::HashMap;
use std::net::IpAddr;

pub trait GeoResolver: Send + Sync {
    fn resolve_country(&self, ip: IpAddr) -> Option<String>;
}

#[derive(Default)]
pub struct NullGeoResolver;

impl GeoResolver for NullGeoResolver {
    fn resolve_country(&self, _ip: IpAddr) -> Option<String> {
        None
    }
}

/// Resolves from a fixed IP-to-country table, loaded at startup.
#[derive(Default)]
pub struct StaticGeoResolver {
    table: HashMap<IpAddr, String>,
}

impl StaticGeoResolver {
    pub fn new(table: HashMap<IpAddr, String>) -> Self {
        Self { table }
    }
}

impl GeoResolver for StaticGeoResolver {
    fn resolve_country(&self, ip: IpAddr) -> Option<String> {
        self.table.get(&ip).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_resolver_never_resolves() {
        let resolver = NullGeoResolver;
        assert_eq!(resolver.resolve_country("127.0.0.1".parse().unwrap()), None);
    }

    #[test]
    fn static_resolver_looks_up_the_table() {
        let mut table = HashMap::new();
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        table.insert(ip, "US".to_string());
        let resolver = StaticGeoResolver::new(table);
        assert_eq!(resolver.resolve_country(ip), Some("US".to_string()));
        assert_eq!(resolver.resolve_country("198.51.100.1".parse().unwrap()), None);
    }
}
