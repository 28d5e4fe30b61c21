//! Network addressing.
//!
//! The proxy talks to exactly one upstream, named as `host:port`.
//! [`UpstreamTarget`] parses that once at startup and builds every outbound
//! URI from it.

pub mod upstream;

pub use upstream::{TargetError, UpstreamTarget};
