/// Request inspection helpers: bearer credential and caller origin
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Caller origin used to enrich audit records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Prefer the first hop of X-Forwarded-For, else the raw peer address
    pub fn from_headers(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
            .map(String::from);

        let ip = forwarded.or_else(|| peer.map(|addr| addr.ip().to_string()));

        let user_agent = headers
            .get("user-agent")
            .and_then(|h| h.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(RequestContext::from_headers(&parts.headers, peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    #[test]
    fn test_bearer_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123token"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123token".to_string()));

        headers.insert("authorization", HeaderValue::from_static("abc123token"));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_forwarded_for_first_hop_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("user-agent", HeaderValue::from_static("curl/8.0"));
        let peer: SocketAddr = "192.0.2.1:5000".parse().unwrap();

        let ctx = RequestContext::from_headers(&headers, Some(peer));
        assert_eq!(ctx.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(ctx.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn test_peer_then_none() {
        let peer: SocketAddr = "192.0.2.1:5000".parse().unwrap();
        let ctx = RequestContext::from_headers(&HeaderMap::new(), Some(peer));
        assert_eq!(ctx.ip.as_deref(), Some("192.0.2.1"));

        let ctx = RequestContext::from_headers(&HeaderMap::new(), None);
        assert_eq!(ctx, RequestContext::default());
    }

    #[tokio::test]
    async fn test_extractor_reads_connect_info() {
        let peer: SocketAddr = "198.51.100.4:443".parse().unwrap();
        let mut req = Request::builder().uri("/").body(()).unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        let (mut parts, _) = req.into_parts();

        let ctx = RequestContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.ip.as_deref(), Some("198.51.100.4"));
    }
}
