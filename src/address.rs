//! Normalizes resolver results into connectable addresses.

use crate::error::AddressError;
use crate::resolve::{BackendAddr, BackendTarget};
use hyper::Uri;

const HTTP_PORT: u16 = 80;
const HTTPS_PORT: u16 = 443;

/// Turn a resolver result into a [`BackendAddr`].
///
/// Structured addresses pass through. URL strings lose a leading `www.`
/// and take their port from the URL, then the scheme, then `is_secure`.
pub fn normalize(target: BackendTarget, is_secure: bool) -> Result<BackendAddr, AddressError> {
    match target {
        BackendTarget::Addr(addr) => Ok(addr),
        BackendTarget::Url(url) => parse_url(&url, is_secure),
    }
}

/// Parse a URL-like string such as `https://www.example.com:8443/path`.
pub fn parse_url(value: &str, is_secure: bool) -> Result<BackendAddr, AddressError> {
    let uri: Uri = value.trim().parse().map_err(|e: hyper::http::uri::InvalidUri| {
        AddressError::InvalidUrl {
            value: value.to_string(),
            reason: e.to_string(),
        }
    })?;

    let host = uri
        .host()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AddressError::MissingHost {
            value: value.to_string(),
        })?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let host = strip_www(host);
    if host.is_empty() {
        return Err(AddressError::MissingHost {
            value: value.to_string(),
        });
    }

    let port = uri
        .port_u16()
        .or_else(|| uri.scheme_str().and_then(scheme_port))
        .unwrap_or(if is_secure { HTTPS_PORT } else { HTTP_PORT });

    Ok(BackendAddr::new(host, port))
}

fn strip_www(host: &str) -> &str {
    match host.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("www.") => &host[4..],
        _ => host,
    }
}

fn scheme_port(scheme: &str) -> Option<u16> {
    match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => Some(HTTP_PORT),
        "https" | "wss" => Some(HTTPS_PORT),
        _ => None,
    }
}
