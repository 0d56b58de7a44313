/// Common server startup utilities
use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::resolve::ResolverType;
use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Common server startup helper
pub struct ServerStarter;

impl ServerStarter {
    /// Spawn a named server future, logging its failure instead of propagating it
    pub fn start_server<F, Fut>(
        name: &str,
        enabled: bool,
        resources: ServerResources,
        server_future: F,
    ) -> Option<JoinHandle<()>>
    where
        F: FnOnce(ServerResources) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        if !enabled {
            info!("{} server is disabled", name);
            return None;
        }

        let name = name.to_string();
        info!("Starting {} server", name);
        let handle = tokio::spawn(async move {
            if let Err(e) = server_future(resources).await {
                error!("{} server error: {:#}", name, e);
            }
        });

        Some(handle)
    }
}

/// Common resources shared across servers
#[derive(Clone)]
pub struct ServerResources {
    pub config: Arc<AppConfig>,
    pub resolver: ResolverType,
    pub metrics: Arc<Metrics>,
}

impl ServerResources {
    pub fn new(config: Arc<AppConfig>, resolver: ResolverType, metrics: Arc<Metrics>) -> Self {
        Self {
            config,
            resolver,
            metrics,
        }
    }
}
