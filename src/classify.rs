//! Pulls the guard's inputs out of an HTTP request: operation class from the
//! path, caller identifier, session id and CSRF token from headers.

use axum::http::{HeaderMap, header};
use std::net::{IpAddr, SocketAddr};

pub const SESSION_HEADER: &str = "x-session-id";
pub const SESSION_COOKIE: &str = "session_id";
pub const CSRF_HEADER: &str = "x-csrf-token";

// Path prefix -> operation class, longest prefix wins
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<(String, String)>,
    fallback: String,
}

impl RouteTable {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            fallback: fallback.into(),
        }
    }

    pub fn add(&mut self, prefix: &str, class: &str) {
        let prefix = prefix.trim_end_matches('/');
        self.rules.push((prefix.to_string(), class.to_string()));
        self.rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    pub fn classify(&self, path: &str) -> &str {
        self.rules
            .iter()
            .find(|(prefix, _)| matches_prefix(path, prefix))
            .map(|(_, class)| class.as_str())
            .unwrap_or(self.fallback.as_str())
    }
}

// "/api" matches "/api" and "/api/x" but not "/apix"
fn matches_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.is_empty(),
        None => false,
    }
}

/// Caller identity. Forwarding headers (`X-Forwarded-For` first hop, then
/// `X-Real-IP`) are read only when the TCP peer is one of `trusted_proxies`;
/// from anyone else the peer address is the identity.
pub fn client_identifier(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted_proxies: &[IpAddr],
) -> Option<String> {
    let peer_ip = peer.map(|addr| addr.ip());

    if peer_ip.is_some_and(|ip| trusted_proxies.contains(&ip)) {
        if let Some(forwarded) = forwarded_client(headers) {
            return Some(forwarded.to_string());
        }
    } else if headers.contains_key("x-forwarded-for") || headers.contains_key("x-real-ip") {
        tracing::debug!(peer = ?peer_ip, "ignoring forwarding headers from untrusted peer");
    }

    peer_ip.map(|ip| ip.to_string())
}

fn forwarded_client(headers: &HeaderMap) -> Option<&str> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded.or(real_ip)
}

pub fn session_id(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
    {
        return Some(value);
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .filter(|v| !v.is_empty())
}

pub fn csrf_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok())
}
