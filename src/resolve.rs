use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A connectable backend address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendAddr {
    pub host: String,
    pub port: u16,
}

impl BackendAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BackendAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<std::net::SocketAddr> for BackendAddr {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// What a resolver hands back: a structured address or a URL-like string
/// such as `http://backend.internal:8080/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BackendTarget {
    Addr(BackendAddr),
    Url(String),
}

impl From<BackendAddr> for BackendTarget {
    fn from(addr: BackendAddr) -> Self {
        BackendTarget::Addr(addr)
    }
}

impl From<std::net::SocketAddr> for BackendTarget {
    fn from(addr: std::net::SocketAddr) -> Self {
        BackendTarget::Addr(addr.into())
    }
}

impl From<&str> for BackendTarget {
    fn from(url: &str) -> Self {
        BackendTarget::Url(url.to_string())
    }
}

impl From<String> for BackendTarget {
    fn from(url: String) -> Self {
        BackendTarget::Url(url)
    }
}

/// Routing policy: maps the hostname seen in the first packet to a backend.
///
/// `hostname` is `None` when the packet carried no usable Host header or SNI.
/// `is_secure` is true for TLS connections. Returning `None` refuses the
/// connection. Implementations are shared by every connection task and are
/// called at most once per connection.
pub trait Resolve: Send + Sync {
    fn resolve(&self, hostname: Option<&str>, is_secure: bool) -> Option<BackendTarget>;
}

impl<F> Resolve for F
where
    F: Fn(Option<&str>, bool) -> Option<BackendTarget> + Send + Sync,
{
    fn resolve(&self, hostname: Option<&str>, is_secure: bool) -> Option<BackendTarget> {
        self(hostname, is_secure)
    }
}

/// Type alias for the resolver used throughout the application
pub type ResolverType = Arc<dyn Resolve>;

/// Wrap a closure as a shared resolver
///
/// # Example
///
/// ```rust
/// use sni_proxy::resolve::{BackendAddr, Resolve, from_fn};
///
/// let resolver = from_fn(|hostname, _is_secure| match hostname {
///     Some("localhost") => Some(BackendAddr::new("127.0.0.1", 8080).into()),
///     _ => None,
/// });
/// assert!(resolver.resolve(Some("localhost"), false).is_some());
/// assert!(resolver.resolve(None, false).is_none());
/// ```
pub fn from_fn<F>(f: F) -> ResolverType
where
    F: Fn(Option<&str>, bool) -> Option<BackendTarget> + Send + Sync + 'static,
{
    Arc::new(f)
}
