//! Client IP resolution.
//!
//! Header precedence, first non-empty wins:
//! `CF-Connecting-IP` → `X-Real-IP` → first `X-Forwarded-For` entry → peer address.
//!
//! The result is neither validated nor decoded; consumers decide what to do
//! with bytes that do not parse as an IP.

use std::net::SocketAddr;

use axum::{body::Bytes, http::HeaderMap};

pub const CF_CONNECTING_IP: &str = "cf-connecting-ip";
pub const X_REAL_IP: &str = "x-real-ip";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolve the originating client IP for a request, as the raw header bytes.
pub fn resolve(headers: &HeaderMap, peer: &str) -> Bytes {
    if let Some(ip) = header_value(headers, CF_CONNECTING_IP) {
        return Bytes::copy_from_slice(ip);
    }
    if let Some(ip) = header_value(headers, X_REAL_IP) {
        return Bytes::copy_from_slice(ip);
    }
    if let Some(forwarded) = header_value(headers, X_FORWARDED_FOR) {
        let first = forwarded
            .split(|&b| b == b',')
            .next()
            .unwrap_or_default();
        return Bytes::copy_from_slice(first.trim_ascii());
    }
    Bytes::from(strip_port(peer))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a [u8]> {
    headers
        .get(name)
        .map(|v| v.as_bytes())
        .filter(|v| !v.is_empty())
}

/// Drop a `:port` suffix from a peer address, handling bracketed IPv6.
/// Anything that is not `host:port` comes back unchanged.
fn strip_port(peer: &str) -> String {
    if let Ok(addr) = peer.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }
    match peer.rsplit_once(':') {
        Some((host, port))
            if !host.is_empty()
                && !host.contains(':')
                && !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host.to_string()
        }
        _ => peer.to_string(),
    }
}
