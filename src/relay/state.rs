//! Relay session lifecycle.
//!
//! ```text
//! Init → UpgradeCheck → Upgrading → Connecting → Open → Closing → Closed
//!             │              │           │
//!             └──────────────┴───────────┴──→ Rejected
//! ```
//!
//! The state lives in an atomic so both relay tasks, the tunnel and any
//! [`SessionHandle`](super::session::SessionHandle) can observe and advance it
//! without a lock. Only the transitions drawn above are accepted.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of one WebSocket relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Init = 0,
    UpgradeCheck = 1,
    Upgrading = 2,
    Connecting = 3,
    Open = 4,
    Closing = 5,
    Closed = 6,
    Rejected = 7,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Init,
            1 => SessionState::UpgradeCheck,
            2 => SessionState::Upgrading,
            3 => SessionState::Connecting,
            4 => SessionState::Open,
            5 => SessionState::Closing,
            6 => SessionState::Closed,
            _ => SessionState::Rejected,
        }
    }

    /// Whether `self → next` is an edge of the state machine.
    pub fn can_transition(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Init, UpgradeCheck)
                | (UpgradeCheck, Upgrading)
                | (UpgradeCheck, Rejected)
                | (Upgrading, Connecting)
                | (Upgrading, Rejected)
                | (Connecting, Open)
                | (Connecting, Rejected)
                | (Open, Closing)
                | (Closing, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Init => "init",
            SessionState::UpgradeCheck => "upgrade_check",
            SessionState::Upgrading => "upgrading",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder for a [`SessionState`].
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Init as u8),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next` if that is a legal edge from the current state.
    ///
    /// Returns false (and changes nothing) otherwise, so concurrent callers
    /// racing for the same edge see exactly one winner.
    pub fn advance(&self, next: SessionState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if !SessionState::from_u8(current).can_transition(next) {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn open_lifecycle() -> Lifecycle {
        let lifecycle = Lifecycle::new();
        for next in [
            SessionState::UpgradeCheck,
            SessionState::Upgrading,
            SessionState::Connecting,
            SessionState::Open,
        ] {
            assert!(lifecycle.advance(next), "failed to enter {}", next);
        }
        lifecycle
    }

    #[test]
    fn test_happy_path() {
        let lifecycle = open_lifecycle();
        assert_eq!(lifecycle.state(), SessionState::Open);
        assert!(lifecycle.advance(SessionState::Closing));
        assert!(lifecycle.advance(SessionState::Closed));
        assert!(lifecycle.state().is_terminal());
    }

    #[test]
    fn test_rejected_paths() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.advance(SessionState::UpgradeCheck));
        assert!(lifecycle.advance(SessionState::Rejected));
        assert!(!lifecycle.advance(SessionState::Upgrading));
        assert_eq!(lifecycle.state(), SessionState::Rejected);

        let lifecycle = Lifecycle::new();
        lifecycle.advance(SessionState::UpgradeCheck);
        lifecycle.advance(SessionState::Upgrading);
        lifecycle.advance(SessionState::Connecting);
        assert!(lifecycle.advance(SessionState::Rejected));
        assert!(!lifecycle.advance(SessionState::Open));
    }

    #[test]
    fn test_illegal_transitions_leave_state_unchanged() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.advance(SessionState::Open));
        assert!(!lifecycle.advance(SessionState::Closed));
        assert_eq!(lifecycle.state(), SessionState::Init);

        let lifecycle = open_lifecycle();
        assert!(!lifecycle.advance(SessionState::Closed));
        assert!(!lifecycle.advance(SessionState::Rejected));
        assert_eq!(lifecycle.state(), SessionState::Open);
    }

    #[test]
    fn test_closing_has_single_winner() {
        let lifecycle = Arc::new(open_lifecycle());
        let winners: usize = (0..8)
            .map(|_| {
                let lifecycle = Arc::clone(&lifecycle);
                std::thread::spawn(move || lifecycle.advance(SessionState::Closing))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
        assert_eq!(lifecycle.state(), SessionState::Closing);
    }
}
