use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize logging system based on configuration.
///
/// Console output always goes to stderr. When `file` is set, a second layer
/// writes there too, optionally as JSON and optionally rotated daily. Keep
/// the returned guard alive for as long as file logging should flush.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let mut layers: Vec<BoxedLayer> = vec![console_layer(env_filter(config))];
    let mut guard = None;

    if let Some(log_file) = &config.file {
        let (writer, file_guard) = if config.rotation {
            let path = Path::new(log_file);
            let appender = tracing_appender::rolling::daily(
                path.parent().unwrap_or_else(|| Path::new(".")),
                path.file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("sni-proxy.log"),
            );
            tracing_appender::non_blocking(appender)
        } else {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)
                .with_context(|| format!("Failed to open log file: {}", log_file))?;
            tracing_appender::non_blocking(file)
        };
        guard = Some(file_guard);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339());
        let file_layer: BoxedLayer = if config.json {
            file_layer.json().with_filter(env_filter(config)).boxed()
        } else {
            file_layer.with_filter(env_filter(config)).boxed()
        };
        layers.push(file_layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// `RUST_LOG` wins over the configured level; unparseable levels fall back to info
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::from_str(&config.level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

fn console_layer(filter: EnvFilter) -> BoxedLayer {
    tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_filter(filter)
        .boxed()
}
