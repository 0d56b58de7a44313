use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::proxy::RouterOptions;
use crate::readers::{HealthcheckServer, ProxyServer};
use crate::resolve::ResolverType;
use crate::resolvers::TableResolver;
use crate::server::{ServerResources, ServerStarter};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

pub struct App {
    config: Arc<AppConfig>,
    pub resolver: ResolverType,
    pub metrics: Arc<Metrics>,
    handles: Vec<JoinHandle<()>>,
}

impl App {
    /// Build the application with the routing table from configuration
    pub fn new(config: AppConfig) -> Self {
        let resolver: ResolverType = Arc::new(TableResolver::new(config.routes.clone()));
        Self::with_resolver(config, resolver)
    }

    /// Build the application around a caller-supplied routing policy
    pub fn with_resolver(config: AppConfig, resolver: ResolverType) -> Self {
        Self {
            config: Arc::new(config),
            resolver,
            metrics: Arc::new(Metrics::new()),
            handles: Vec::new(),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        info!("Starting SNI Proxy Server...");

        let resources = ServerResources::new(
            Arc::clone(&self.config),
            Arc::clone(&self.resolver),
            Arc::clone(&self.metrics),
        );

        let proxy = ProxyServer::new(
            Arc::clone(&resources.resolver),
            RouterOptions::from(&self.config.proxy),
            Arc::clone(&resources.metrics),
        )
        .context("Invalid proxy options")?;
        let bind_addr = self.config.proxy.bind_addr()?;

        if let Some(handle) =
            ServerStarter::start_server("Proxy", true, resources.clone(), move |_| async move {
                let listener = TcpListener::bind(bind_addr)
                    .await
                    .with_context(|| format!("Failed to bind proxy to {}", bind_addr))?;
                info!("Proxy listening on TCP {}", listener.local_addr()?);
                proxy.serve(listener).await;
                Ok(())
            })
        {
            self.handles.push(handle);
        }

        if let Some(handle) = ServerStarter::start_server(
            "Healthcheck",
            self.config.healthcheck.enabled,
            resources,
            |resources| async move {
                HealthcheckServer::new(resources.config.healthcheck.clone(), resources.metrics)
                    .start()
                    .await
            },
        ) {
            self.handles.push(handle);
        }

        info!("All enabled servers started");
        Ok(())
    }

    /// Stop every server task started by [`App::start`]
    pub async fn wait_for_shutdown(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
            let _ = handle.await;
        }
        info!("All servers stopped");
    }
}
