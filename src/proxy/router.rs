use crate::address;
use crate::config::{DEFAULT_FIRST_PACKET_BUFFER_SIZE, ProxyConfig};
use crate::error::{BackendError, ProxyError, ProxyResult};
use crate::host::extract_host;
use crate::metrics::Metrics;
use crate::policy::{Disposition, classify_backend_error};
use crate::proxy::splice::{SpliceStats, splice};
use crate::resolve::{BackendAddr, ResolverType};
use crate::sni::{is_tls_handshake, parse_sni};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Per-connection behaviour of the router
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub first_packet_buffer_size: usize,
    pub first_packet_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub nodelay: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            first_packet_buffer_size: DEFAULT_FIRST_PACKET_BUFFER_SIZE,
            first_packet_timeout: None,
            connect_timeout: None,
            nodelay: true,
        }
    }
}

impl RouterOptions {
    pub fn validate(&self) -> ProxyResult<()> {
        if self.first_packet_buffer_size == 0 {
            return Err(ProxyError::Config(
                "first packet buffer size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<&ProxyConfig> for RouterOptions {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            first_packet_buffer_size: config.first_packet_buffer_size,
            first_packet_timeout: config.first_packet_timeout(),
            connect_timeout: config.connect_timeout(),
            nodelay: config.nodelay,
        }
    }
}

/// What the first packet says about the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    pub is_secure: bool,
    pub hostname: Option<String>,
}

/// Classify the first packet as TLS or plaintext HTTP and pull out the hostname
pub fn inspect(data: &[u8]) -> Inspection {
    if is_tls_handshake(data) {
        let hostname = match parse_sni(data) {
            Ok(hostname) => Some(hostname),
            Err(reason) => {
                debug!("No SNI hostname in ClientHello: {}", reason);
                None
            }
        };
        Inspection {
            is_secure: true,
            hostname,
        }
    } else {
        Inspection {
            is_secure: false,
            hostname: extract_host(data),
        }
    }
}

/// Read the first chunk of data, exactly once.
///
/// An empty result means the peer closed before sending anything.
pub async fn read_first_packet<R>(reader: &mut R, buffer_size: usize) -> std::io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(buffer_size);
    reader.read_buf(&mut buffer).await?;
    Ok(buffer.freeze())
}

/// How a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Spliced to a backend until one side closed
    Spliced {
        backend: BackendAddr,
        stats: SpliceStats,
    },
    /// The resolver had no route; the client was closed
    Unrouted { hostname: Option<String> },
    /// The client closed or stayed silent before sending anything
    NoData,
    /// The backend refused or reset the connection; the client was closed
    BackendUnavailable { backend: BackendAddr },
}

/// Routes one inbound connection from its first packet
#[derive(Clone)]
pub struct ConnectionRouter {
    resolver: ResolverType,
    options: RouterOptions,
    metrics: Arc<Metrics>,
}

impl ConnectionRouter {
    pub fn new(resolver: ResolverType, options: RouterOptions, metrics: Arc<Metrics>) -> Self {
        Self {
            resolver,
            options,
            metrics,
        }
    }

    pub async fn route(&self, mut client: TcpStream) -> ProxyResult<Outcome> {
        if self.options.nodelay {
            client.set_nodelay(true)?;
        }

        let Some(data) = self.first_packet(&mut client).await? else {
            close_gracefully(client).await;
            return Ok(Outcome::NoData);
        };

        let Inspection {
            is_secure,
            hostname,
        } = inspect(&data);
        debug!(
            ?hostname,
            is_secure,
            bytes = data.len(),
            "Inspected first packet"
        );

        let Some(target) = self.resolver.resolve(hostname.as_deref(), is_secure) else {
            info!(?hostname, is_secure, "No route, closing connection");
            self.metrics.record_unrouted();
            close_gracefully(client).await;
            return Ok(Outcome::Unrouted { hostname });
        };

        let backend_addr = address::normalize(target, is_secure)?;

        let mut backend = match self.connect(&backend_addr).await {
            Ok(stream) => stream,
            Err(e) => return self.backend_failed(client, backend_addr, e).await,
        };

        if let Err(source) = backend.write_all(&data).await {
            let err = BackendError::Replay {
                addr: backend_addr.to_string(),
                source,
            };
            return self.backend_failed(client, backend_addr, err).await;
        }
        let replayed = data.len() as u64;
        drop(data);

        info!(
            ?hostname,
            is_secure,
            backend = %backend_addr,
            "Splicing connection to backend"
        );
        let _session = self.metrics.session_started();
        let stats = splice(client, backend).await;
        self.metrics
            .record_transfer(replayed + stats.client_to_backend, stats.backend_to_client);
        debug!(
            backend = %backend_addr,
            client_to_backend = stats.client_to_backend,
            backend_to_client = stats.backend_to_client,
            closed_by = ?stats.closed_by,
            "Session closed"
        );

        Ok(Outcome::Spliced {
            backend: backend_addr,
            stats,
        })
    }

    async fn first_packet(&self, client: &mut TcpStream) -> ProxyResult<Option<Bytes>> {
        let read = read_first_packet(client, self.options.first_packet_buffer_size);
        let data = match self.options.first_packet_timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(result) => result?,
                Err(_) => {
                    debug!("No data within {:?}, closing connection", limit);
                    self.metrics.record_unrouted();
                    return Ok(None);
                }
            },
            None => read.await?,
        };
        Ok((!data.is_empty()).then_some(data))
    }

    async fn connect(&self, addr: &BackendAddr) -> Result<TcpStream, ProxyError> {
        let connect = TcpStream::connect((addr.host.as_str(), addr.port));
        let result = match self.options.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
                ProxyError::Timeout(format!("connect to backend {} after {:?}", addr, limit))
            })?,
            None => connect.await,
        };

        let stream = result.map_err(|source| BackendError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        if self.options.nodelay {
            stream.set_nodelay(true)?;
        }
        Ok(stream)
    }

    async fn backend_failed(
        &self,
        client: TcpStream,
        backend: BackendAddr,
        err: impl Into<ProxyError>,
    ) -> ProxyResult<Outcome> {
        let err = err.into();
        let disposition = match &err {
            ProxyError::Backend(e) => classify_backend_error(e.io_error()),
            _ => Disposition::Surface,
        };

        match disposition {
            Disposition::Ignore => {
                debug!(backend = %backend, "Backend unavailable: {}", err);
                self.metrics.record_backend_error(true);
                close_gracefully(client).await;
                Ok(Outcome::BackendUnavailable { backend })
            }
            Disposition::Surface => {
                self.metrics.record_backend_error(false);
                Err(err)
            }
        }
    }
}

/// Send FIN and drop the socket
async fn close_gracefully(mut stream: TcpStream) {
    if let Err(e) = stream.shutdown().await {
        debug!("Shutdown of client connection failed: {}", e);
    }
}
