//! Upstream response relay.
//!
//! Status and headers are copied, hop-by-hop headers dropped, and the body is
//! handed back as a stream without buffering or transformation.

use axum::body::{Body, Bytes, HttpBody};
use axum::http::Response;
use axum::BoxError;

use crate::http::headers::strip_hop_by_hop;

/// Turn an upstream response into the response sent to the caller.
pub fn relay_response<B>(response: Response<B>) -> Response<Body>
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}
