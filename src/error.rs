/// Error types for SNI Proxy
use thiserror::Error;

/// Main error type for proxy operations
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resolver result could not be turned into a backend address
    #[error("Backend address error: {0}")]
    Address(#[from] AddressError),

    /// Backend connection errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Network I/O errors
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors
    #[error("Operation timeout: {0}")]
    Timeout(String),
}

/// Errors produced while normalizing a resolver result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The string is not a parseable URL
    #[error("Invalid backend URL {value:?}: {reason}")]
    InvalidUrl { value: String, reason: String },

    /// The URL parsed but carries no hostname
    #[error("Backend URL {value:?} has no hostname")]
    MissingHost { value: String },
}

/// Backend connection errors
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection could not be established
    #[error("Failed to connect to backend {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The buffered first packet could not be written to the backend
    #[error("Failed to replay first packet to backend {addr}: {source}")]
    Replay {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl BackendError {
    /// The underlying I/O error
    pub fn io_error(&self) -> &std::io::Error {
        match self {
            BackendError::Connect { source, .. } | BackendError::Replay { source, .. } => source,
        }
    }
}

/// Reasons a ClientHello yielded no server name
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniError {
    /// A length or offset pointed past the end of the buffer
    #[error("ClientHello truncated")]
    Truncated,

    /// No server_name extension present
    #[error("No server_name extension")]
    NotFound,

    /// server_name entry is not a DNS hostname (RFC 6066 name type 0)
    #[error("Unsupported server name type: {0}")]
    UnsupportedNameType(u8),

    /// Hostname bytes are not valid UTF-8
    #[error("Server name is not valid UTF-8")]
    InvalidUtf8,
}

/// Result type alias for convenience
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Helper trait to convert errors to [`ProxyError`].
///
/// Wraps errors from external operations (parsing, validation) into
/// [`ProxyError::Config`] with additional context.
///
/// # Example
///
/// ```rust
/// use sni_proxy::error::ToProxyError;
///
/// let result: Result<u16, &'static str> = Err("invalid port");
/// let converted = result.to_proxy_error("proxy.port").unwrap_err();
/// assert!(converted.to_string().contains("proxy.port"));
/// ```
pub trait ToProxyError<T> {
    /// Convert the result to a [`ProxyResult`] with context.
    fn to_proxy_error(self, context: &str) -> ProxyResult<T>;
}

impl<T, E: std::fmt::Display> ToProxyError<T> for Result<T, E> {
    fn to_proxy_error(self, context: &str) -> ProxyResult<T> {
        self.map_err(|e| ProxyError::Config(format!("{}: {}", context, e)))
    }
}
