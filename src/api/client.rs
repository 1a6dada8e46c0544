//! Client address extraction for audit entries.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;

const UNKNOWN_ADDRESS: &str = "unknown";

// =============================================================================
// ClientAddress
// =============================================================================

/// Address of the client that sent the request.
///
/// Resolved in order from the first `X-Forwarded-For` hop, `X-Real-IP`, the
/// TCP peer address, and finally `"unknown"`. Header values that are not IP
/// addresses are skipped, so the stored address is always a normalized IP.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientAddress(String);

impl ClientAddress {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Resolves the address from proxy headers and the peer socket address.
    #[must_use]
    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        forwarded_for(headers)
            .or_else(|| header_value(headers, "x-real-ip").and_then(|value| parse_ip(&value)))
            .or_else(|| peer.map(|address| address.ip()))
            .map_or_else(|| Self::new(UNKNOWN_ADDRESS), |ip| Self(ip.to_string()))
    }
}

impl std::fmt::Display for ClientAddress {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Accepts a bare IP or an `ip:port` pair.
fn parse_ip(value: &str) -> Option<IpAddr> {
    value
        .parse::<IpAddr>()
        .or_else(|_| value.parse::<SocketAddr>().map(|address| address.ip()))
        .ok()
}

/// Only the client-most hop is trusted; a malformed one falls through.
fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    header_value(headers, "x-forwarded-for").and_then(|value| {
        value
            .split(',')
            .map(str::trim)
            .find(|hop| !hop.is_empty())
            .and_then(parse_ip)
    })
}

// =============================================================================
// ClientAddress Extractor
// =============================================================================

impl<State> FromRequestParts<State> for ClientAddress
where
    State: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &State,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(address)| *address);

        Ok(Self::resolve(&parts.headers, peer))
    }
}

// =============================================================================
// Tests
// =============================================================================
