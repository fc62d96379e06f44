//! HTTP route handlers organized by functionality.

pub mod activities;
pub mod agents;
pub mod claim;
pub mod health;

use std::net::SocketAddr;

use axum::http::HeaderMap;

use crate::error::ApiError;
use crate::server::AppState;

/// Identifier used to bucket unauthenticated callers: first hop of
/// X-Forwarded-For when present (we sit behind a proxy in production),
/// otherwise the peer socket address.
pub(crate) fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

/// Reject early when the caller's fixed window is exhausted.
pub(crate) fn enforce_rate_limit(
    state: &AppState,
    headers: &HeaderMap,
    peer: SocketAddr,
) -> Result<(), ApiError> {
    let identifier = client_ip(headers, peer);
    match state.rate_limiter.check(&identifier) {
        crate::services::rate_limit::Decision::Allowed { .. } => Ok(()),
        crate::services::rate_limit::Decision::Limited { retry_after_ms } => {
            tracing::warn!("rate limited {}", identifier);
            Err(ApiError::RateLimited { retry_after_ms })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer(last_octet: u8) -> SocketAddr {
        SocketAddr::from(([192, 0, 2, last_octet], 40000))
    }

    #[test]
    fn forwarded_header_wins_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, peer(7)), "203.0.113.9");
    }

    #[test]
    fn missing_header_falls_back_to_peer_address() {
        assert_eq!(client_ip(&HeaderMap::new(), peer(7)), "192.0.2.7");
    }

    #[test]
    fn direct_peers_get_distinct_buckets() {
        assert_ne!(
            client_ip(&HeaderMap::new(), peer(7)),
            client_ip(&HeaderMap::new(), peer(8))
        );
    }
}
