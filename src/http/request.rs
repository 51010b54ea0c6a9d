//! Request identification and upstream request construction.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for every inbound request
//! - Build the forwarded header set (clone + proxy attribution headers)
//! - Build the upstream request from the inbound absolute URI
//!
//! # Design Decisions
//! - Inbound headers are cloned, never mutated in place
//! - Hop-by-hop headers are dropped in both directions; hyper re-frames
//!   every message it sends

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, Request, Uri};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::error::ProxyError;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Value of the `Via` header added to forwarded requests.
pub const VIA: &str = "1.1 floki-proxy";

/// Generates UUID v4 request IDs for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// The request ID set by the request-id layer, or "unknown".
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Parsed `Content-Length`, if present and valid.
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Check if a header is a hop-by-hop header that should not be forwarded.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-connection"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Copy end-to-end headers, dropping hop-by-hop ones and any header the
/// `Connection` header names.
pub fn end_to_end_headers(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    let mut copied = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || listed.iter().any(|token| token == name.as_str()) {
            continue;
        }
        copied.append(name.clone(), value.clone());
    }
    copied
}

/// Headers for the upstream request: the inbound end-to-end headers plus
/// `Via` and the `X-Forwarded-*` attribution headers.
pub fn forwarded_headers(inbound: &HeaderMap, client: SocketAddr, host: Option<&str>) -> HeaderMap {
    let mut headers = end_to_end_headers(inbound);

    headers.append(header::VIA, HeaderValue::from_static(VIA));

    let client_ip = client.ip().to_string();
    let chain = match inbound.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.trim().is_empty() => format!("{}, {}", prior, client_ip),
        _ => client_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(X_FORWARDED_FOR, value);
    }

    if let Some(value) = host.and_then(|h| HeaderValue::from_str(h).ok()) {
        headers.insert(X_FORWARDED_HOST, value);
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));

    headers
}

/// Host the client addressed: the Host header, else the URI authority.
pub fn inbound_host(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| uri.authority().map(|a| a.to_string()))
}

/// Build the upstream request. The target must be an absolute URI.
pub fn build_upstream_request(
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<Request<Body>, ProxyError> {
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(ProxyError::UpstreamConstruction(format!(
            "request target {:?} is not an absolute URI",
            uri.to_string()
        )));
    }

    let mut request = Request::builder().method(method).uri(uri.clone()).body(body)?;
    *request.headers_mut() = headers;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SocketAddr {
        "10.1.2.3:55000".parse().unwrap()
    }

    #[test]
    fn test_hop_by_hop_headers() {
        assert!(is_hop_by_hop(&header::CONNECTION));
        assert!(is_hop_by_hop(&header::TRANSFER_ENCODING));
        assert!(is_hop_by_hop(&HeaderName::from_static("keep-alive")));
        assert!(is_hop_by_hop(&HeaderName::from_static("proxy-connection")));
        assert!(is_hop_by_hop(&header::UPGRADE));

        assert!(!is_hop_by_hop(&header::CONTENT_TYPE));
        assert!(!is_hop_by_hop(&header::CONTENT_LENGTH));
        assert!(!is_hop_by_hop(&header::HOST));
    }

    #[test]
    fn test_forwarded_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("upstream.test"));
        inbound.insert(header::ACCEPT, HeaderValue::from_static("text/plain"));
        inbound.append(header::COOKIE, HeaderValue::from_static("a=1"));
        inbound.append(header::COOKIE, HeaderValue::from_static("b=2"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-private"));
        inbound.insert("x-private", HeaderValue::from_static("secret"));
        inbound.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        let headers = forwarded_headers(&inbound, client(), Some("upstream.test"));

        assert_eq!(headers[header::HOST], "upstream.test");
        assert_eq!(headers[header::ACCEPT], "text/plain");
        assert_eq!(headers.get_all(header::COOKIE).iter().count(), 2);
        assert_eq!(headers[header::VIA], VIA);
        assert_eq!(headers[X_FORWARDED_FOR], "10.1.2.3");
        assert_eq!(headers[X_FORWARDED_HOST], "upstream.test");
        assert_eq!(headers[X_FORWARDED_PROTO], "http");
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("x-private").is_none());
        assert!(headers.get(header::TRANSFER_ENCODING).is_none());

        // The inbound map is left untouched.
        assert!(inbound.get(header::VIA).is_none());
        assert_eq!(inbound.len(), 7);
    }

    #[test]
    fn test_forwarded_for_appends_to_chain() {
        let mut inbound = HeaderMap::new();
        inbound.insert(X_FORWARDED_FOR, HeaderValue::from_static("192.0.2.1"));
        let headers = forwarded_headers(&inbound, client(), None);
        assert_eq!(headers[X_FORWARDED_FOR], "192.0.2.1, 10.1.2.3");
        assert!(headers.get(X_FORWARDED_HOST).is_none());
    }

    #[test]
    fn test_inbound_host_falls_back_to_authority() {
        let uri: Uri = "http://example.test:8080/a".parse().unwrap();
        assert_eq!(inbound_host(&HeaderMap::new(), &uri).as_deref(), Some("example.test:8080"));

        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("other.test"));
        assert_eq!(inbound_host(&headers, &uri).as_deref(), Some("other.test"));
    }

    #[test]
    fn test_build_requires_absolute_uri() {
        let origin_form: Uri = "/only/a/path".parse().unwrap();
        let result = build_upstream_request(Method::GET, &origin_form, HeaderMap::new(), Body::empty());
        assert!(matches!(result, Err(ProxyError::UpstreamConstruction(_))));

        let absolute: Uri = "http://upstream.test/a?b=c".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        let request = build_upstream_request(Method::PUT, &absolute, headers, Body::empty()).unwrap();
        assert_eq!(request.method(), Method::PUT);
        assert_eq!(request.uri(), &absolute);
        assert_eq!(request.headers()[header::ACCEPT], "*/*");
    }

    #[test]
    fn test_content_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), None);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        assert_eq!(content_length(&headers), Some(42));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("nope"));
        assert_eq!(content_length(&headers), None);
    }

    #[test]
    fn test_uuid_request_ids_are_unique() {
        let mut maker = UuidRequestId;
        let request = Request::new(());
        let a = maker.make_request_id(&request).unwrap();
        let b = maker.make_request_id(&request).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }
}
