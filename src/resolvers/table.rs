use crate::config::RoutesConfig;
use crate::resolve::{BackendTarget, Resolve};
use dashmap::DashMap;
use tracing::debug;

/// Routing table resolver built from `[routes]` configuration.
///
/// TLS connections look in `tls_hosts` before `hosts`. Missing or unknown
/// hostnames fall back to `default` when one is configured.
pub struct TableResolver {
    hosts: DashMap<String, BackendTarget>,
    tls_hosts: DashMap<String, BackendTarget>,
    default: Option<BackendTarget>,
}

impl TableResolver {
    pub fn new(config: RoutesConfig) -> Self {
        let hosts = DashMap::new();
        for (hostname, target) in config.hosts {
            hosts.insert(normalize_hostname(&hostname), target);
        }
        let tls_hosts = DashMap::new();
        for (hostname, target) in config.tls_hosts {
            tls_hosts.insert(normalize_hostname(&hostname), target);
        }
        Self {
            hosts,
            tls_hosts,
            default: config.default,
        }
    }

    /// Add or replace a route used by both protocols
    pub fn insert(&self, hostname: &str, target: impl Into<BackendTarget>) {
        self.hosts.insert(normalize_hostname(hostname), target.into());
    }

    /// Add or replace a TLS-only route
    pub fn insert_tls(&self, hostname: &str, target: impl Into<BackendTarget>) {
        self.tls_hosts
            .insert(normalize_hostname(hostname), target.into());
    }

    /// Remove a hostname from both tables
    pub fn remove(&self, hostname: &str) -> bool {
        let key = normalize_hostname(hostname);
        let plain = self.hosts.remove(&key).is_some();
        let tls = self.tls_hosts.remove(&key).is_some();
        plain || tls
    }

    pub fn len(&self) -> usize {
        self.hosts.len() + self.tls_hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, hostname: &str, is_secure: bool) -> Option<BackendTarget> {
        let key = normalize_hostname(hostname);
        if is_secure && let Some(target) = self.tls_hosts.get(&key) {
            return Some(target.clone());
        }
        self.hosts.get(&key).map(|target| target.clone())
    }
}

impl Resolve for TableResolver {
    fn resolve(&self, hostname: Option<&str>, is_secure: bool) -> Option<BackendTarget> {
        let found = hostname.and_then(|h| self.lookup(h, is_secure));
        if found.is_none() {
            debug!(?hostname, is_secure, "No route for hostname, trying default");
        }
        found.or_else(|| self.default.clone())
    }
}

/// Hostnames compare case-insensitively and without a trailing root dot
fn normalize_hostname(hostname: &str) -> String {
    hostname.trim().trim_end_matches('.').to_ascii_lowercase()
}
