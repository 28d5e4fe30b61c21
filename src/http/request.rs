//! Request capture and request IDs.
//!
//! # Responsibilities
//! - Give every request an `x-request-id` (UUID v4) as early as possible
//! - Capture an inbound request as a [`ProxyRequest`]
//! - Rebuild it as an outbound request aimed at the upstream target
//!
//! # Design Decisions
//! - The body stays a stream; nothing here buffers it
//! - Host is replaced with the upstream address, hop-by-hop headers dropped,
//!   every other header copied as received

use axum::body::{Body, HttpBody};
use axum::http::header::HOST;
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Version};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::error::ProxyError;
use crate::http::headers::strip_hop_by_hop;
use crate::net::upstream::UpstreamTarget;

pub const X_REQUEST_ID: &str = "x-request-id";

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

/// The request ID of `headers`, or `"unknown"`.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// An inbound request captured for forwarding.
#[derive(Debug)]
pub struct ProxyRequest {
    method: Method,
    path_and_query: Option<PathAndQuery>,
    headers: HeaderMap,
    body: Option<Body>,
}

impl ProxyRequest {
    pub fn capture(request: Request<Body>) -> Self {
        let (parts, body) = request.into_parts();
        let body = if body.is_end_stream() { None } else { Some(body) };
        Self {
            method: parts.method,
            path_and_query: parts.uri.path_and_query().cloned(),
            headers: parts.headers,
            body,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        self.path_and_query
            .as_ref()
            .map(PathAndQuery::path)
            .unwrap_or("/")
    }

    pub fn query(&self) -> Option<&str> {
        self.path_and_query.as_ref().and_then(PathAndQuery::query)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Build the equivalent request for `target`.
    pub fn into_upstream(self, target: &UpstreamTarget) -> Result<Request<Body>, ProxyError> {
        let uri = target.http_uri(self.path_and_query.as_ref())?;

        let mut headers = self.headers;
        strip_hop_by_hop(&mut headers);
        headers.insert(HOST, target.host_header());

        let mut request = Request::new(self.body.unwrap_or_else(Body::empty));
        *request.method_mut() = self.method;
        *request.uri_mut() = uri;
        *request.version_mut() = Version::HTTP_11;
        *request.headers_mut() = headers;
        Ok(request)
    }
}
