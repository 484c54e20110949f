use std::{fmt, net::SocketAddr};

use actix_web::{
    FromRequest, HttpMessage, HttpRequest,
    dev::{Payload, ServiceRequest},
    http::header::HeaderMap,
};
use futures::future::{Ready, ready};

/// Bucket shared by every caller whose address could not be determined.
pub const UNKNOWN_IP: &str = "unknown";

/// Best-effort client address used to key anonymous quotas and request logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_IP
    }
}

impl fmt::Display for ClientIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves the caller address: first hop of `X-Forwarded-For`, then
/// `X-Real-IP`, then the socket peer, then [`UNKNOWN_IP`].
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientIp {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    if let Some(first_hop) = header_value("x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return ClientIp(first_hop.to_string());
    }

    if let Some(real_ip) = header_value("x-real-ip") {
        return ClientIp(real_ip.to_string());
    }

    peer.map(|addr| ClientIp(addr.ip().to_string()))
        .unwrap_or_else(|| ClientIp(UNKNOWN_IP.to_string()))
}

/// Returns the address stored by the extraction middleware, resolving it on the spot otherwise.
pub fn get_client_ip(req: &ServiceRequest) -> ClientIp {
    if let Some(ip) = req.extensions().get::<ClientIp>() {
        return ip.clone();
    }
    resolve_client_ip(req.headers(), req.peer_addr())
}

impl FromRequest for ClientIp {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let ip = req
            .extensions()
            .get::<ClientIp>()
            .cloned()
            .unwrap_or_else(|| resolve_client_ip(req.headers(), req.peer_addr()));
        ready(Ok(ip))
    }
}
