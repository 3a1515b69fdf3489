//! Caller identity extractor.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

use questline_common::Identity;
use questline_common::constants::headers;

/// Who is making the request.
///
/// A numeric `X-User-Id` (set by the upstream auth proxy) selects a user
/// identity. Otherwise the caller is a guest keyed by client IP: the first
/// `X-Forwarded-For` hop, then the socket address.
#[derive(Debug, Clone)]
pub struct Caller {
    pub identity: Identity,
    /// Fingerprint of the client address, used for rate limiting
    pub client: String,
}

impl Caller {
    fn from_parts(parts: &Parts) -> Self {
        let ip = client_ip(parts);
        let client = match Identity::guest(&ip) {
            Identity::Guest(fingerprint) => fingerprint,
            Identity::User(id) => id.to_string(),
        };

        let identity = parts
            .headers
            .get(headers::X_USER_ID)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|&id| id > 0)
            .map(Identity::User)
            .unwrap_or_else(|| Identity::guest(&ip));

        Self { identity, client }
    }
}

fn client_ip(parts: &Parts) -> String {
    let forwarded = parts
        .headers
        .get(headers::X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let caller = Self::from_parts(parts);
        async move { Ok(caller) }
    }
}
