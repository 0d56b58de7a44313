pub mod address;
pub mod app;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod metrics;
pub mod policy;
pub mod proxy;
pub mod readers;
pub mod resolve;
pub mod resolvers;
pub mod server;
pub mod sni;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::{AppConfig, ProxyConfig, RoutesConfig};
pub use error::{ProxyError, ProxyResult};
pub use readers::{ProxyServer, RunningProxy, create_proxy};
pub use resolve::{BackendAddr, BackendTarget, Resolve, ResolverType};
