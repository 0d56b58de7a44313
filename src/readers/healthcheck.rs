use crate::config::HealthcheckConfig;
use crate::metrics::Metrics;
use anyhow::{Context, Result};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Liveness and metrics endpoint for the proxy process itself
pub struct HealthcheckServer {
    config: HealthcheckConfig,
    metrics: Arc<Metrics>,
}

impl HealthcheckServer {
    pub fn new(config: HealthcheckConfig, metrics: Arc<Metrics>) -> Self {
        Self { config, metrics }
    }

    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Healthcheck server is disabled");
            return Ok(());
        }

        let listener = self.bind().await?;
        self.serve(listener).await
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let bind_addr = self.config.bind_addr()?;
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind healthcheck server to {}", bind_addr))?;

        info!(
            "Healthcheck server listening on {} at path {}",
            listener.local_addr()?,
            self.config.path
        );
        Ok(listener)
    }

    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, client_addr)) => {
                    let path = self.config.path.clone();
                    let metrics = Arc::clone(&self.metrics);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let path = path.clone();
                            let metrics = Arc::clone(&metrics);
                            async move { handle_healthcheck(req, &path, &metrics).await }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            error!("Healthcheck connection error from {}: {}", client_addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Healthcheck accept error: {}", e);
                }
            }
        }
    }
}

async fn handle_healthcheck(
    req: Request<hyper::body::Incoming>,
    healthcheck_path: &str,
    metrics: &Metrics,
) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    if req.method() != Method::GET {
        return Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .body(Full::new(Bytes::from("Method not allowed")));
    }

    match req.uri().path() {
        "/metrics" => match metrics.render() {
            Ok(body) => Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body))),
            Err(e) => {
                error!("Failed to render metrics: {}", e);
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Full::new(Bytes::from("Failed to render metrics")))
            }
        },
        "/stats" => json_response(serde_json::json!(metrics.snapshot())),
        path if path == healthcheck_path => json_response(serde_json::json!({
            "status": "healthy",
            "service": "sni-proxy"
        })),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not found"))),
    }
}

fn json_response(body: serde_json::Value) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
}
