//! Client identity derivation.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header::USER_AGENT, request::Parts, HeaderMap},
};
use sha2::{Digest, Sha256};

/// Proxy chain header; the first entry is the original client.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
/// Single-address header set by some reverse proxies.
pub const X_REAL_IP: &str = "x-real-ip";

/// Derive a stable client identity from request metadata.
///
/// Order of precedence:
/// 1. First address in `X-Forwarded-For`
/// 2. `X-Real-IP`
/// 3. The connection's peer address
/// 4. `ua-` followed by a SHA-256 prefix of the `User-Agent` header
pub fn client_identity(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    if let Some(first) = header_str(headers, X_FORWARDED_FOR)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return first.to_string();
    }

    if let Some(real_ip) = header_str(headers, X_REAL_IP)
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return real_ip.to_string();
    }

    if let Some(ip) = peer {
        return ip.to_string();
    }

    user_agent_fingerprint(header_str(headers, USER_AGENT.as_str()).unwrap_or(""))
}

/// Short, stable hash of a user-agent string.
pub fn user_agent_fingerprint(user_agent: &str) -> String {
    let digest = Sha256::digest(user_agent.as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    format!("ua-{}", hex)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Extractor yielding the caller's identity.
///
/// The peer address is only available when the server is started with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());
        Ok(Self(client_identity(&parts.headers, peer)))
    }
}
