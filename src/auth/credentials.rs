//! Ordered credential-source extraction for handshakes and HTTP requests.
//!
//! A connection attempt may carry its bearer credential in several places.
//! Each source is tried in a fixed priority order; the first one that yields
//! a credential wins. Sources are independent — a malformed value in one does
//! not stop the scan.

use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use std::collections::HashMap;

/// A place a bearer credential may be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// The explicit `token` field of the handshake auth payload
    /// (a query parameter on the websocket upgrade request).
    AuthPayload,
    /// An `Authorization: Bearer <token>` header.
    AuthorizationHeader,
    /// A cookie named `token`.
    Cookie,
}

/// Priority order for websocket handshakes.
const HANDSHAKE_SOURCES: [CredentialSource; 3] = [
    CredentialSource::AuthPayload,
    CredentialSource::AuthorizationHeader,
    CredentialSource::Cookie,
];

/// Priority order for plain HTTP requests (no handshake payload).
const HTTP_SOURCES: [CredentialSource; 2] = [
    CredentialSource::AuthorizationHeader,
    CredentialSource::Cookie,
];

impl CredentialSource {
    fn lookup(&self, query: &HashMap<String, String>, headers: &HeaderMap) -> Option<String> {
        match self {
            CredentialSource::AuthPayload => {
                query.get("token").filter(|t| !t.is_empty()).cloned()
            }
            CredentialSource::AuthorizationHeader => headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            CredentialSource::Cookie => headers
                .get(COOKIE)
                .and_then(|v| v.to_str().ok())
                .and_then(|raw| parse_cookies(raw).remove("token"))
                .filter(|t| !t.is_empty()),
        }
    }
}

/// Extract a bearer credential from a websocket handshake.
pub fn extract_bearer(query: &HashMap<String, String>, headers: &HeaderMap) -> Option<String> {
    HANDSHAKE_SOURCES
        .iter()
        .find_map(|source| source.lookup(query, headers))
}

/// Extract a bearer credential from a plain HTTP request.
pub fn extract_bearer_http(headers: &HeaderMap) -> Option<String> {
    let empty = HashMap::new();
    HTTP_SOURCES
        .iter()
        .find_map(|source| source.lookup(&empty, headers))
}

fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
