use crate::address;
use crate::resolve::BackendTarget;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Maximum TLS plaintext record (16 KiB) plus the 5-byte record header
pub const DEFAULT_FIRST_PACKET_BUFFER_SIZE: usize = 16 * 1024 + 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
    #[serde(default)]
    pub healthcheck: HealthcheckConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub bind_address: String,
    pub port: u16,
    /// Size of the single read that captures the first packet
    #[serde(default = "default_first_packet_buffer_size")]
    pub first_packet_buffer_size: usize,
    /// Close connections that send nothing within this window (unset: wait forever)
    #[serde(default)]
    pub first_packet_timeout_ms: Option<u64>,
    /// Give up on a backend connect after this long (unset: OS default)
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default = "default_true")]
    pub nodelay: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutesConfig {
    /// Hostname to backend, for both plaintext and TLS connections
    #[serde(default)]
    pub hosts: HashMap<String, BackendTarget>,
    /// Hostname to backend for TLS connections, checked before `hosts`
    #[serde(default)]
    pub tls_hosts: HashMap<String, BackendTarget>,
    /// Used when the hostname is missing or has no route
    #[serde(default)]
    pub default: Option<BackendTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthcheckConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
    #[serde(default = "default_health_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file path; console only when unset
    #[serde(default)]
    pub file: Option<String>,
    /// Emit JSON lines to the log file
    #[serde(default)]
    pub json: bool,
    /// Rotate the log file daily
    #[serde(default = "default_true")]
    pub rotation: bool,
}

fn default_first_packet_buffer_size() -> usize {
    DEFAULT_FIRST_PACKET_BUFFER_SIZE
}

fn default_true() -> bool {
    true
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            first_packet_buffer_size: DEFAULT_FIRST_PACKET_BUFFER_SIZE,
            first_packet_timeout_ms: None,
            connect_timeout_ms: None,
            nodelay: true,
        }
    }
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1".to_string(),
            port: 9090,
            path: default_health_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            json: false,
            rotation: true,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            proxy: ProxyConfig::default(),
            routes: RoutesConfig::default(),
            healthcheck: HealthcheckConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ProxyConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid proxy bind address: {}:{}",
                    self.bind_address, self.port
                )
            })
    }

    pub fn first_packet_timeout(&self) -> Option<Duration> {
        self.first_packet_timeout_ms.map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

impl HealthcheckConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid healthcheck bind address: {}:{}",
                    self.bind_address, self.port
                )
            })
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        Ok(config)
    }

    /// Load configuration from file or use default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config file, using defaults: {}", e);
            Self::default()
        })
    }

    /// Check everything that would otherwise only fail once traffic arrives
    pub fn validate(&self) -> Result<()> {
        self.proxy.bind_addr()?;

        if self.proxy.first_packet_buffer_size == 0 {
            anyhow::bail!("proxy.first_packet_buffer_size must be greater than zero");
        }
        if self.proxy.first_packet_timeout_ms == Some(0) {
            anyhow::bail!("proxy.first_packet_timeout_ms must be greater than zero when set");
        }
        if self.proxy.connect_timeout_ms == Some(0) {
            anyhow::bail!("proxy.connect_timeout_ms must be greater than zero when set");
        }

        for (table, routes) in [
            ("routes.hosts", &self.routes.hosts),
            ("routes.tls_hosts", &self.routes.tls_hosts),
        ] {
            for (hostname, target) in routes {
                if hostname.trim().is_empty() {
                    anyhow::bail!("{} contains an empty hostname", table);
                }
                address::normalize(target.clone(), table == "routes.tls_hosts")
                    .with_context(|| format!("Invalid backend for {}.{:?}", table, hostname))?;
            }
        }
        if let Some(target) = &self.routes.default {
            address::normalize(target.clone(), false)
                .context("Invalid backend for routes.default")?;
        }

        if self.healthcheck.enabled {
            let health_addr = self.healthcheck.bind_addr()?;
            if !self.healthcheck.path.starts_with('/') {
                anyhow::bail!(
                    "healthcheck.path must start with '/': {}",
                    self.healthcheck.path
                );
            }
            if health_addr.port() != 0 && health_addr.port() == self.proxy.port {
                anyhow::bail!(
                    "Port conflict: proxy and healthcheck both use port {}",
                    self.proxy.port
                );
            }
        }

        Ok(())
    }
}
