use crate::error::{ProxyError, ProxyResult};
use crate::metrics::Metrics;
use crate::proxy::{ConnectionRouter, Outcome, RouterOptions};
use crate::resolve::ResolverType;
use crate::utils::backoff::BackoffCounter;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span};

const ACCEPT_BACKOFF_BASE_MS: u64 = 10;
const ACCEPT_BACKOFF_MAX_MS: u64 = 1000;

/// Build a proxy server with default options around a resolver
pub fn create_proxy(resolver: ResolverType) -> ProxyServer {
    ProxyServer::build(
        resolver,
        RouterOptions::default(),
        Arc::new(Metrics::new()),
    )
}

/// TCP listener that routes every accepted connection by its first packet
#[derive(Clone)]
pub struct ProxyServer {
    router: ConnectionRouter,
    metrics: Arc<Metrics>,
}

impl ProxyServer {
    /// Fails on invalid options, before any socket is bound
    pub fn new(
        resolver: ResolverType,
        options: RouterOptions,
        metrics: Arc<Metrics>,
    ) -> ProxyResult<Self> {
        options.validate()?;
        Ok(Self::build(resolver, options, metrics))
    }

    fn build(resolver: ResolverType, options: RouterOptions, metrics: Arc<Metrics>) -> Self {
        Self {
            router: ConnectionRouter::new(resolver, options, Arc::clone(&metrics)),
            metrics,
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Bind `addr` and run the accept loop in the background
    pub async fn listen<A: ToSocketAddrs>(self, addr: A) -> ProxyResult<RunningProxy> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Proxy listening on TCP {}", local_addr);

        let handle = tokio::spawn(async move {
            self.serve(listener).await;
        });

        Ok(RunningProxy { local_addr, handle })
    }

    /// Accept connections forever; one task per connection
    pub async fn serve(self, listener: TcpListener) {
        let backoff = BackoffCounter::new();

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    backoff.reset();
                    self.metrics.record_connection();
                    let router = self.router.clone();
                    let span = info_span!("connection", %peer);
                    tokio::spawn(
                        async move {
                            debug!("Accepted connection");
                            match router.route(stream).await {
                                Ok(Outcome::Spliced { backend, stats }) => debug!(
                                    %backend,
                                    client_to_backend = stats.client_to_backend,
                                    backend_to_client = stats.backend_to_client,
                                    "Connection completed"
                                ),
                                Ok(outcome) => debug!(?outcome, "Connection closed"),
                                Err(e) => error!("Connection handling error from {}: {}", peer, e),
                            }
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    let delay = backoff.next_delay(ACCEPT_BACKOFF_BASE_MS, ACCEPT_BACKOFF_MAX_MS);
                    error!("Proxy accept error: {}, retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Handle to a proxy accept loop running in the background
pub struct RunningProxy {
    local_addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl RunningProxy {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting; sessions already spliced keep running
    pub async fn shutdown(self) -> ProxyResult<()> {
        self.handle.abort();
        match self.handle.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(ProxyError::Io(std::io::Error::other(e))),
        }
    }
}
