//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → classifier.rs (prefix match against routing.api_prefix)
//!     → Local: application router
//!     → Proxy: proxy entry point (forwarder or tunnel)
//! ```
//!
//! # Design Decisions
//! - The prefix is fixed when the server is built
//! - Deterministic: same path always gets the same route

pub mod classifier;

pub use classifier::{classify, PathClassifier, Route};
