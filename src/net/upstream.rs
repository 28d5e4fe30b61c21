//! Upstream target resolution.
//!
//! The asset dev server is named by a single `host:port` string. It is parsed
//! once when the server is built and shared read-only afterwards. Name
//! resolution happens per connection in the connectors; there is no discovery
//! and no retry here.

use std::fmt;
use std::str::FromStr;

use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{HeaderValue, Uri};
use thiserror::Error;

use crate::error::ProxyError;

/// Why an upstream address was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("address is empty")]
    Empty,

    #[error("{0:?} must be host:port without a scheme")]
    HasScheme(String),

    #[error("{0:?} is not a valid host:port")]
    Invalid(String),

    #[error("{0:?} has no port")]
    MissingPort(String),

    #[error("{0:?} has port 0")]
    ZeroPort(String),
}

/// The single asset dev server all proxied traffic goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    authority: Authority,
    port: u16,
    host_header: HeaderValue,
}

impl UpstreamTarget {
    /// Parse a `host:port` string.
    pub fn parse(address: &str) -> Result<Self, TargetError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(TargetError::Empty);
        }
        if address.contains("://") {
            return Err(TargetError::HasScheme(address.to_string()));
        }
        if address.contains('@') {
            return Err(TargetError::Invalid(address.to_string()));
        }

        let authority = Authority::from_str(address)
            .map_err(|_| TargetError::Invalid(address.to_string()))?;
        let port = authority
            .port_u16()
            .ok_or_else(|| TargetError::MissingPort(address.to_string()))?;
        if port == 0 {
            return Err(TargetError::ZeroPort(address.to_string()));
        }
        let host_header = HeaderValue::from_str(authority.as_str())
            .map_err(|_| TargetError::Invalid(address.to_string()))?;

        Ok(Self {
            authority,
            port,
            host_header,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn host(&self) -> &str {
        self.authority.host()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Value for the `Host` header of outbound requests.
    pub fn host_header(&self) -> HeaderValue {
        self.host_header.clone()
    }

    /// `http://<target><path><query>`
    pub fn http_uri(&self, path_and_query: Option<&PathAndQuery>) -> Result<Uri, ProxyError> {
        self.uri(Scheme::HTTP, path_and_query)
    }

    /// `ws://<target><path><query>`
    pub fn ws_uri(&self, path_and_query: Option<&PathAndQuery>) -> Result<Uri, ProxyError> {
        let scheme = Scheme::from_str("ws")
            .map_err(|e| ProxyError::InvalidUpstreamRequest(e.to_string()))?;
        self.uri(scheme, path_and_query)
    }

    fn uri(&self, scheme: Scheme, path_and_query: Option<&PathAndQuery>) -> Result<Uri, ProxyError> {
        let path_and_query = path_and_query
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        Uri::builder()
            .scheme(scheme)
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| ProxyError::InvalidUpstreamRequest(e.to_string()))
    }
}

impl FromStr for UpstreamTarget {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.authority.as_str())
    }
}
