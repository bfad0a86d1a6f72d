//! Request source address

use crate::{ApiError, ApiState};
use cloudgate_core::canonical_address;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Address the request originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceAddress(pub IpAddr);

/// First hop of `X-Forwarded-For`
pub fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get(FORWARDED_FOR_HEADER)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

#[async_trait]
impl FromRequestParts<Arc<ApiState>> for SourceAddress {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiState>,
    ) -> Result<Self, Self::Rejection> {
        if state.trust_forwarded_for {
            if let Some(addr) = forwarded_for(&parts.headers) {
                return Ok(Self(canonical_address(addr)));
            }
        }

        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(peer)| Self(canonical_address(peer.ip())))
            .ok_or_else(|| ApiError::BadRequest("unable to determine source address".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::net::Ipv4Addr;

    #[test]
    fn test_forwarded_for_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR_HEADER,
            HeaderValue::from_static("54.12.1.9, 10.0.0.1"),
        );
        assert_eq!(
            forwarded_for(&headers),
            Some(IpAddr::V4(Ipv4Addr::new(54, 12, 1, 9)))
        );
    }

    #[test]
    fn test_forwarded_for_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static("unknown"));
        assert_eq!(forwarded_for(&headers), None);
    }

    #[test]
    fn test_forwarded_for_mapped_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static("::ffff:127.0.0.1"));
        let addr = forwarded_for(&headers).map(canonical_address);
        assert_eq!(addr, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }
}
