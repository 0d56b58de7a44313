//! Server Name Indication extraction from a raw TLS ClientHello record.
//!
//! Works on a single record using fixed offsets; no reassembly across
//! records and no TLS library involved.

use crate::error::SniError;

/// TLS record content type for handshake messages
pub const TLS_HANDSHAKE_RECORD: u8 = 0x16;

/// Record header (5) + handshake header (4) + client version (2) + random (32)
const SESSION_ID_OFFSET: usize = 43;

const EXT_SERVER_NAME: u16 = 0x0000;
const NAME_TYPE_HOST_NAME: u8 = 0;

/// list length (2) + name type (1) + name length (2)
const SERVER_NAME_PREFIX_LEN: usize = 5;

/// Whether the first byte of a packet marks a TLS handshake record
pub fn is_tls_handshake(data: &[u8]) -> bool {
    data.first() == Some(&TLS_HANDSHAKE_RECORD)
}

/// Extract the SNI hostname, treating every failure as "no hostname".
pub fn extract_sni(data: &[u8]) -> Option<String> {
    parse_sni(data).ok()
}

/// Extract the SNI hostname, keeping the reason when there is none.
pub fn parse_sni(data: &[u8]) -> Result<String, SniError> {
    let mut pos = SESSION_ID_OFFSET;

    // session id
    pos = advance(pos, 1 + read_u8(data, pos)? as usize)?;
    // cipher suites
    pos = advance(pos, 2 + read_u16(data, pos)? as usize)?;
    // compression methods
    pos = advance(pos, 1 + read_u8(data, pos)? as usize)?;
    // total extensions length, not checked against the buffer
    pos = advance(pos, 2)?;

    while pos < data.len() {
        let ext_type = read_u16(data, pos)?;
        let ext_len = read_u16(data, pos + 2)? as usize;

        if ext_type != EXT_SERVER_NAME {
            pos = advance(pos, 4 + ext_len)?;
            continue;
        }

        let ext_data = pos + 4;
        let name_type = read_u8(data, ext_data + 2)?;
        if name_type != NAME_TYPE_HOST_NAME {
            return Err(SniError::UnsupportedNameType(name_type));
        }

        let name_len = ext_len
            .checked_sub(SERVER_NAME_PREFIX_LEN)
            .ok_or(SniError::Truncated)?;
        let start = ext_data + SERVER_NAME_PREFIX_LEN;
        let name = data
            .get(start..start + name_len)
            .ok_or(SniError::Truncated)?;

        return std::str::from_utf8(name)
            .map(str::to_owned)
            .map_err(|_| SniError::InvalidUtf8);
    }

    Err(SniError::NotFound)
}

fn read_u8(data: &[u8], pos: usize) -> Result<u8, SniError> {
    data.get(pos).copied().ok_or(SniError::Truncated)
}

fn read_u16(data: &[u8], pos: usize) -> Result<u16, SniError> {
    match data.get(pos..pos + 2) {
        Some(&[hi, lo]) => Ok(u16::from_be_bytes([hi, lo])),
        _ => Err(SniError::Truncated),
    }
}

fn advance(pos: usize, by: usize) -> Result<usize, SniError> {
    pos.checked_add(by).ok_or(SniError::Truncated)
}
