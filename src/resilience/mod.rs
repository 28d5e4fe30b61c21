//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → timeouts.rs (connect deadline, response-header deadline)
//!     → on expiry: UpstreamTimeout → 502 / close code 1011
//!
//! Relay session:
//!     → timeouts.rs (idle deadline shared by both directions)
//! ```
//!
//! # Design Decisions
//! - No retries: a dev server that is down should fail fast and visibly

pub mod timeouts;

pub use timeouts::{with_deadline, ProxyTimeouts};
