//! Which backend failures are expected and dropped quietly.
//!
//! Proxied sessions carry no idle timeout: a spliced pair stays open for as
//! long as both peers keep it open.

use std::io::ErrorKind;

/// Backend connect failures that close the client without being reported
pub const IGNORED_BACKEND_ERRORS: [ErrorKind; 2] =
    [ErrorKind::ConnectionRefused, ErrorKind::ConnectionReset];

/// How a backend failure is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Close the client silently
    Ignore,
    /// Report as the connection's error
    Surface,
}

/// Classify a backend I/O error
pub fn classify_backend_error(err: &std::io::Error) -> Disposition {
    if IGNORED_BACKEND_ERRORS.contains(&err.kind()) {
        Disposition::Ignore
    } else {
        Disposition::Surface
    }
}
