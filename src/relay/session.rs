//! A relay session: one downstream and one upstream WebSocket, two pumps.
//!
//! ```text
//!             ┌──────── pump: downstream → upstream ────────┐
//!  client ────┤                                             ├──── asset dev server
//!             └──────── pump: upstream → downstream ────────┘
//!                          shared CancellationToken
//! ```
//!
//! Each pump owns the sink it writes to, so each connection is closed by
//! exactly one task. Whichever pump stops first moves the lifecycle to
//! `Closing` and cancels the token; the other pump wakes, closes its own sink
//! and exits. The session is `Closed` once both pumps have returned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ProxyError, Side};
use crate::observability::metrics;
use crate::relay::message::RelayMessage;
use crate::relay::state::{Lifecycle, SessionState};
use crate::relay::tracker::{SessionGuard, SessionId};

/// Upper bound on flushing a close frame to a peer that stopped reading.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Direction of one pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    DownstreamToUpstream,
    UpstreamToDownstream,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::DownstreamToUpstream => "downstream_to_upstream",
            Direction::UpstreamToDownstream => "upstream_to_downstream",
        }
    }

    /// The side this pump reads from.
    fn source(self) -> Side {
        match self {
            Direction::DownstreamToUpstream => Side::Downstream,
            Direction::UpstreamToDownstream => Side::Upstream,
        }
    }
}

/// Why a session ended.
#[derive(Debug)]
pub enum CloseCause {
    DownstreamClosed,
    UpstreamClosed,
    /// Closed through a [`SessionHandle`] or server shutdown.
    Cancelled,
    Failed(ProxyError),
}

/// What a finished session did.
#[derive(Debug)]
pub struct RelaySummary {
    pub id: SessionId,
    pub downstream_to_upstream: u64,
    pub upstream_to_downstream: u64,
    pub cause: CloseCause,
}

/// Cloneable control handle for a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    lifecycle: Arc<Lifecycle>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    /// Ask the session to close both connections. Calling this on a session
    /// that is already closing or closed does nothing.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Time of the last relayed message in either direction.
#[derive(Debug)]
struct Activity {
    origin: Instant,
    last_millis: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_millis: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        self.last_millis.store(elapsed, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_millis.load(Ordering::Relaxed));
        self.origin.elapsed().saturating_sub(last)
    }
}

#[derive(Debug)]
enum PumpEnd {
    SourceClosed,
    Cancelled,
    Failed(ProxyError),
}

#[derive(Debug)]
struct PumpReport {
    direction: Direction,
    forwarded: u64,
    end: PumpEnd,
    /// This pump moved the session to `Closing`.
    initiated_close: bool,
}

#[derive(Clone)]
struct PumpContext {
    id: SessionId,
    direction: Direction,
    lifecycle: Arc<Lifecycle>,
    cancel: CancellationToken,
    activity: Arc<Activity>,
    idle_timeout: Option<Duration>,
}

impl PumpContext {
    fn with_direction(&self, direction: Direction) -> Self {
        Self {
            direction,
            ..self.clone()
        }
    }

    /// Enter `Closing` (first caller only) and wake the other pump.
    fn begin_close(&self, end: &PumpEnd) -> bool {
        let first = self.lifecycle.advance(SessionState::Closing);
        if first {
            match end {
                PumpEnd::SourceClosed => tracing::debug!(
                    session_id = %self.id,
                    side = %self.direction.source(),
                    "Peer closed, closing relay session"
                ),
                PumpEnd::Cancelled => tracing::debug!(
                    session_id = %self.id,
                    "Relay session cancelled"
                ),
                PumpEnd::Failed(e) => tracing::warn!(
                    session_id = %self.id,
                    direction = self.direction.as_str(),
                    error = %e,
                    "Relay error, closing relay session"
                ),
            }
        }
        self.cancel.cancel();
        first
    }
}

/// Paired downstream/upstream connections for one accepted upgrade.
pub struct RelaySession {
    lifecycle: Arc<Lifecycle>,
    cancel: CancellationToken,
    idle_timeout: Option<Duration>,
    guard: SessionGuard,
}

impl RelaySession {
    /// Build a session whose lifecycle has already reached `Open`.
    ///
    /// `parent` is the server's shutdown token; cancelling it closes the
    /// session.
    pub fn new(
        guard: SessionGuard,
        lifecycle: Arc<Lifecycle>,
        parent: &CancellationToken,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            lifecycle,
            cancel: parent.child_token(),
            idle_timeout,
            guard,
        }
    }

    pub fn id(&self) -> SessionId {
        self.guard.id()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id(),
            lifecycle: Arc::clone(&self.lifecycle),
            cancel: self.cancel.clone(),
        }
    }

    /// Relay until either side stops, then close both.
    pub async fn run<DK, DS, UK, US>(self, downstream: (DK, DS), upstream: (UK, US)) -> RelaySummary
    where
        DK: Sink<RelayMessage, Error = ProxyError> + Unpin + Send + 'static,
        DS: Stream<Item = Result<RelayMessage, ProxyError>> + Unpin + Send + 'static,
        UK: Sink<RelayMessage, Error = ProxyError> + Unpin + Send + 'static,
        US: Stream<Item = Result<RelayMessage, ProxyError>> + Unpin + Send + 'static,
    {
        let id = self.id();
        let (downstream_sink, downstream_stream) = downstream;
        let (upstream_sink, upstream_stream) = upstream;

        let ctx = PumpContext {
            id,
            direction: Direction::DownstreamToUpstream,
            lifecycle: Arc::clone(&self.lifecycle),
            cancel: self.cancel.clone(),
            activity: Arc::new(Activity::new()),
            idle_timeout: self.idle_timeout,
        };

        tracing::debug!(session_id = %id, "Relay session open");

        let inbound = tokio::spawn(pump(
            ctx.with_direction(Direction::DownstreamToUpstream),
            downstream_stream,
            upstream_sink,
        ));
        let outbound = tokio::spawn(pump(
            ctx.with_direction(Direction::UpstreamToDownstream),
            upstream_stream,
            downstream_sink,
        ));

        let (inbound, outbound) = tokio::join!(inbound, outbound);
        let inbound = inbound
            .unwrap_or_else(|e| PumpReport::aborted(Direction::DownstreamToUpstream, e));
        let outbound = outbound
            .unwrap_or_else(|e| PumpReport::aborted(Direction::UpstreamToDownstream, e));

        // A pump that panicked never entered Closing itself.
        self.lifecycle.advance(SessionState::Closing);
        self.lifecycle.advance(SessionState::Closed);

        let summary = RelaySummary {
            id,
            downstream_to_upstream: inbound.forwarded,
            upstream_to_downstream: outbound.forwarded,
            cause: close_cause(inbound, outbound),
        };

        tracing::info!(
            session_id = %id,
            downstream_to_upstream = summary.downstream_to_upstream,
            upstream_to_downstream = summary.upstream_to_downstream,
            cause = ?summary.cause,
            "Relay session closed"
        );

        summary
    }
}

impl PumpReport {
    fn aborted(direction: Direction, err: tokio::task::JoinError) -> Self {
        Self {
            direction,
            forwarded: 0,
            end: PumpEnd::Failed(ProxyError::relay(
                direction.source(),
                format!("relay task aborted: {}", err),
            )),
            initiated_close: false,
        }
    }
}

fn close_cause(a: PumpReport, b: PumpReport) -> CloseCause {
    let (first, second) = if b.initiated_close && !a.initiated_close {
        (b, a)
    } else {
        (a, b)
    };
    let decisive = if first.initiated_close || !matches!(first.end, PumpEnd::Cancelled) {
        first
    } else {
        second
    };
    match decisive.end {
        PumpEnd::SourceClosed => match decisive.direction.source() {
            Side::Downstream => CloseCause::DownstreamClosed,
            Side::Upstream => CloseCause::UpstreamClosed,
        },
        PumpEnd::Cancelled => CloseCause::Cancelled,
        PumpEnd::Failed(e) => CloseCause::Failed(e),
    }
}

async fn pump<S, K>(ctx: PumpContext, mut source: S, mut sink: K) -> PumpReport
where
    S: Stream<Item = Result<RelayMessage, ProxyError>> + Unpin,
    K: Sink<RelayMessage, Error = ProxyError> + Unpin,
{
    // Wakes the other pump even if this one unwinds.
    let _cancel_on_exit = ctx.cancel.clone().drop_guard();

    let mut forwarded = 0u64;
    let mut close_forwarded = false;

    let end = loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break PumpEnd::Cancelled,
            next = next_message(&mut source, &ctx.activity, ctx.idle_timeout) => next,
        };
        let message = match next {
            Ok(Some(message)) => message,
            Ok(None) => break PumpEnd::SourceClosed,
            Err(e) => break PumpEnd::Failed(e),
        };

        ctx.activity.touch();
        let is_close = message.is_close();
        let sent = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break PumpEnd::Cancelled,
            sent = sink.send(message) => sent,
        };
        if let Err(e) = sent {
            break PumpEnd::Failed(e);
        }
        if is_close {
            close_forwarded = true;
            break PumpEnd::SourceClosed;
        }
        forwarded += 1;
        metrics::relay_message(ctx.direction.as_str());
    };

    let initiated_close = ctx.begin_close(&end);

    // The peer behind `sink` already got a close frame if one was relayed.
    if !close_forwarded {
        let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
    }

    PumpReport {
        direction: ctx.direction,
        forwarded,
        end,
        initiated_close,
    }
}

/// Next message from `source`, failing once the whole session (both
/// directions) has been quiet for `idle_timeout`.
async fn next_message<S>(
    source: &mut S,
    activity: &Activity,
    idle_timeout: Option<Duration>,
) -> Result<Option<RelayMessage>, ProxyError>
where
    S: Stream<Item = Result<RelayMessage, ProxyError>> + Unpin,
{
    let Some(idle_timeout) = idle_timeout else {
        return source.next().await.transpose();
    };
    loop {
        let remaining = idle_timeout.saturating_sub(activity.idle_for());
        if remaining.is_zero() {
            return Err(ProxyError::IdleTimeout(idle_timeout));
        }
        if let Ok(next) = tokio::time::timeout(remaining, source.next()).await {
            return next.transpose();
        }
    }
}
