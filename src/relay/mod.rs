//! WebSocket relay subsystem.
//!
//! # Data Flow
//! ```text
//! accepted downstream WebSocket + connected upstream WebSocket
//!     → message.rs (adapt both into RelayMessage halves)
//!     → session.rs (two pumps, shared cancellation)
//!     → state.rs (lifecycle: Open → Closing → Closed)
//!     → tracker.rs (live session count, drain on shutdown)
//! ```
//!
//! # Design Decisions
//! - One session per accepted upgrade; never pooled or reused
//! - Each pump owns the sink it writes to, so every connection is closed once
//! - FIFO per direction, no ordering across directions

pub mod message;
pub mod session;
pub mod state;
pub mod tracker;

pub use message::{CloseReason, RelayMessage};
pub use session::{CloseCause, Direction, RelaySession, RelaySummary, SessionHandle};
pub use state::{Lifecycle, SessionState};
pub use tracker::{SessionGuard, SessionId, SessionTracker};
