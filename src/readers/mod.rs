pub mod healthcheck;
pub mod tcp;

pub use healthcheck::HealthcheckServer;
pub use tcp::{ProxyServer, RunningProxy, create_proxy};
