/// Connection and throughput metrics, exported in Prometheus text format
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Metrics collector for proxy connections
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Accepted inbound connections
    pub connections: IntCounter,
    /// Connections that reached a backend and were spliced
    pub routed: IntCounter,
    /// Connections closed because no route was found
    pub unrouted: IntCounter,
    /// Backend failures reported as errors
    pub backend_errors: IntCounter,
    /// Refused/reset backend connects that closed the client quietly
    pub backend_errors_ignored: IntCounter,
    pub bytes_client_to_backend: IntCounter,
    pub bytes_backend_to_client: IntCounter,
    /// Sessions currently spliced
    pub active_sessions: IntGauge,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

// Names are static and each registry is fresh, so registration cannot fail
fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::with_opts(Opts::new(name, help)).expect("valid counter");
    registry
        .register(Box::new(counter.clone()))
        .expect("unique counter");
    counter
}

impl Metrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Self {
        let registry = Registry::new();

        let connections = counter(
            &registry,
            "sni_proxy_connections_total",
            "Inbound connections accepted",
        );
        let routed = counter(
            &registry,
            "sni_proxy_connections_routed_total",
            "Connections spliced to a backend",
        );
        let unrouted = counter(
            &registry,
            "sni_proxy_connections_unrouted_total",
            "Connections closed without a route",
        );
        let backend_errors = counter(
            &registry,
            "sni_proxy_backend_errors_total",
            "Backend failures reported as errors",
        );
        let backend_errors_ignored = counter(
            &registry,
            "sni_proxy_backend_errors_ignored_total",
            "Refused or reset backend connections closed quietly",
        );
        let bytes_client_to_backend = counter(
            &registry,
            "sni_proxy_bytes_client_to_backend_total",
            "Bytes forwarded from clients to backends",
        );
        let bytes_backend_to_client = counter(
            &registry,
            "sni_proxy_bytes_backend_to_client_total",
            "Bytes forwarded from backends to clients",
        );

        let active_sessions = IntGauge::with_opts(Opts::new(
            "sni_proxy_active_sessions",
            "Sessions currently spliced",
        ))
        .expect("valid gauge");
        registry
            .register(Box::new(active_sessions.clone()))
            .expect("unique gauge");

        Self {
            registry,
            connections,
            routed,
            unrouted,
            backend_errors,
            backend_errors_ignored,
            bytes_client_to_backend,
            bytes_backend_to_client,
            active_sessions,
        }
    }

    pub fn record_connection(&self) {
        self.connections.inc();
    }

    pub fn record_unrouted(&self) {
        self.unrouted.inc();
    }

    pub fn record_backend_error(&self, ignored: bool) {
        if ignored {
            self.backend_errors_ignored.inc();
        } else {
            self.backend_errors.inc();
        }
    }

    /// Mark a session as spliced; the guard keeps the active gauge accurate
    pub fn session_started(&self) -> SessionGuard {
        self.routed.inc();
        self.active_sessions.inc();
        SessionGuard {
            gauge: self.active_sessions.clone(),
        }
    }

    pub fn record_transfer(&self, client_to_backend: u64, backend_to_client: u64) {
        self.bytes_client_to_backend.inc_by(client_to_backend);
        self.bytes_backend_to_client.inc_by(backend_to_client);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections: self.connections.get(),
            routed: self.routed.get(),
            unrouted: self.unrouted.get(),
            backend_errors: self.backend_errors.get(),
            backend_errors_ignored: self.backend_errors_ignored.get(),
            bytes_client_to_backend: self.bytes_client_to_backend.get(),
            bytes_backend_to_client: self.bytes_backend_to_client.get(),
            active_sessions: self.active_sessions.get(),
        }
    }

    /// Prometheus text exposition of every metric
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Decrements the active session gauge when dropped
pub struct SessionGuard {
    gauge: IntGauge,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub connections: u64,
    pub routed: u64,
    pub unrouted: u64,
    pub backend_errors: u64,
    pub backend_errors_ignored: u64,
    pub bytes_client_to_backend: u64,
    pub bytes_backend_to_client: u64,
    pub active_sessions: i64,
}
