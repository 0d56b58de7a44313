//! `Host:` header extraction from the first packet of an HTTP/1.x request.

const HOST_HEADER: &[u8] = b"host:";

/// Find the first line starting with `Host:` (any case) and return its
/// hostname, without any `:port` suffix.
pub fn extract_host(data: &[u8]) -> Option<String> {
    data.split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .find_map(host_value)
}

fn host_value(line: &[u8]) -> Option<String> {
    if line.len() < HOST_HEADER.len() || !line[..HOST_HEADER.len()].eq_ignore_ascii_case(HOST_HEADER)
    {
        return None;
    }
    let value = line[HOST_HEADER.len()..].trim_ascii();

    let host = if value.starts_with(b"[") {
        // IPv6 literal keeps its brackets, port follows the closing one
        let end = value.iter().position(|&b| b == b']')?;
        &value[..=end]
    } else {
        let end = value.iter().position(|&b| b == b':').unwrap_or(value.len());
        value[..end].trim_ascii_end()
    };

    if host.is_empty() {
        return None;
    }
    std::str::from_utf8(host).ok().map(str::to_owned)
}
