//! Relay session identity and lifetime tracking.
//!
//! # Responsibilities
//! - Generate unique session IDs for tracing
//! - Count live relay sessions
//! - Let shutdown (and tests) wait until every session has been released

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::observability::metrics;

/// Global atomic counter for session IDs.
/// Relaxed ordering is enough: only uniqueness matters.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Generate a new unique session ID.
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

/// Counts live relay sessions.
///
/// The count is published on a watch channel so waiters wake on every change
/// instead of polling.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    active: Arc<watch::Sender<u64>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            active: Arc::new(tx),
        }
    }

    /// Record a new live session. The returned guard releases it on drop.
    pub fn track(&self) -> SessionGuard {
        self.active.send_modify(|count| *count += 1);
        metrics::session_opened();
        SessionGuard {
            active: Arc::clone(&self.active),
            id: SessionId::new(),
        }
    }

    /// Current number of live sessions.
    pub fn active_count(&self) -> u64 {
        *self.active.borrow()
    }

    /// Wait until no session is live.
    pub async fn wait_for_drain(&self) {
        let mut rx = self.active.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    /// Wait for drain, giving up after `limit`. Returns true if drained.
    pub async fn wait_for_drain_within(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.wait_for_drain()).await.is_ok()
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard held by a relay session for its whole lifetime.
#[derive(Debug)]
pub struct SessionGuard {
    active: Arc<watch::Sender<u64>>,
    id: SessionId,
}

impl SessionGuard {
    /// Get this session's ID.
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active
            .send_modify(|count| *count = count.saturating_sub(1));
        metrics::session_closed();
        tracing::trace!(session_id = %self.id, "Session released");
    }
}
