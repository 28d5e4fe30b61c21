//! Transport-neutral relay messages.
//!
//! The downstream socket is an axum `WebSocket` and the upstream socket is a
//! tokio-tungstenite stream. Both are adapted here into halves that speak
//! [`RelayMessage`] and fail with [`ProxyError`], so the session code never
//! sees either library's types.

use axum::body::Bytes;
use axum::extract::ws::{
    CloseFrame as DownstreamCloseFrame, Message as DownstreamMessage, Utf8Bytes, WebSocket,
};
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamCloseFrame;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::WebSocketStream;

use crate::error::{ProxyError, Side};

/// Close code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

/// One WebSocket message on its way through a relay session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseReason>),
}

impl RelayMessage {
    pub fn is_close(&self) -> bool {
        matches!(self, RelayMessage::Close(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RelayMessage::Text(_) => "text",
            RelayMessage::Binary(_) => "binary",
            RelayMessage::Ping(_) => "ping",
            RelayMessage::Pong(_) => "pong",
            RelayMessage::Close(_) => "close",
        }
    }

    /// Convert an upstream message. Raw frames never come out of a read and
    /// are dropped.
    pub fn from_upstream(message: UpstreamMessage) -> Option<Self> {
        let message = match message {
            UpstreamMessage::Text(text) => RelayMessage::Text(text.as_str().to_owned()),
            UpstreamMessage::Binary(data) => RelayMessage::Binary(data),
            UpstreamMessage::Ping(data) => RelayMessage::Ping(data),
            UpstreamMessage::Pong(data) => RelayMessage::Pong(data),
            UpstreamMessage::Close(frame) => RelayMessage::Close(frame.map(|f| CloseReason {
                code: u16::from(f.code),
                reason: f.reason.as_str().to_owned(),
            })),
            UpstreamMessage::Frame(_) => return None,
        };
        Some(message)
    }
}

impl From<DownstreamMessage> for RelayMessage {
    fn from(message: DownstreamMessage) -> Self {
        match message {
            DownstreamMessage::Text(text) => RelayMessage::Text(text.as_str().to_owned()),
            DownstreamMessage::Binary(data) => RelayMessage::Binary(data),
            DownstreamMessage::Ping(data) => RelayMessage::Ping(data),
            DownstreamMessage::Pong(data) => RelayMessage::Pong(data),
            DownstreamMessage::Close(frame) => RelayMessage::Close(frame.map(|f| CloseReason {
                code: f.code,
                reason: f.reason.as_str().to_owned(),
            })),
        }
    }
}

impl From<RelayMessage> for DownstreamMessage {
    fn from(message: RelayMessage) -> Self {
        match message {
            RelayMessage::Text(text) => DownstreamMessage::Text(Utf8Bytes::from(text)),
            RelayMessage::Binary(data) => DownstreamMessage::Binary(data),
            RelayMessage::Ping(data) => DownstreamMessage::Ping(data),
            RelayMessage::Pong(data) => DownstreamMessage::Pong(data),
            RelayMessage::Close(reason) => {
                DownstreamMessage::Close(reason.map(|r| DownstreamCloseFrame {
                    code: r.code,
                    reason: Utf8Bytes::from(r.reason),
                }))
            }
        }
    }
}

impl From<RelayMessage> for UpstreamMessage {
    fn from(message: RelayMessage) -> Self {
        match message {
            RelayMessage::Text(text) => UpstreamMessage::Text(text.into()),
            RelayMessage::Binary(data) => UpstreamMessage::Binary(data),
            RelayMessage::Ping(data) => UpstreamMessage::Ping(data),
            RelayMessage::Pong(data) => UpstreamMessage::Pong(data),
            RelayMessage::Close(reason) => UpstreamMessage::Close(reason.map(|r| UpstreamCloseFrame {
                code: CloseCode::from(r.code),
                reason: r.reason.into(),
            })),
        }
    }
}

/// Split an accepted downstream socket into relay halves.
pub fn downstream_halves(
    socket: WebSocket,
) -> (
    impl Sink<RelayMessage, Error = ProxyError> + Unpin + Send + 'static,
    impl Stream<Item = Result<RelayMessage, ProxyError>> + Unpin + Send + 'static,
) {
    let (sink, stream) = socket.split();
    let sink = sink
        .sink_map_err(|e| ProxyError::relay(Side::Downstream, e))
        .with(|message: RelayMessage| {
            future::ready(Ok::<_, ProxyError>(DownstreamMessage::from(message)))
        });
    let stream = stream.map(|next| {
        next.map(RelayMessage::from)
            .map_err(|e| ProxyError::relay(Side::Downstream, e))
    });
    (sink, stream)
}

/// Split a connected upstream socket into relay halves.
pub fn upstream_halves<S>(
    socket: WebSocketStream<S>,
) -> (
    impl Sink<RelayMessage, Error = ProxyError> + Unpin + Send + 'static,
    impl Stream<Item = Result<RelayMessage, ProxyError>> + Unpin + Send + 'static,
)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = socket.split();
    let sink = sink
        .sink_map_err(|e| ProxyError::relay(Side::Upstream, e))
        .with(|message: RelayMessage| {
            future::ready(Ok::<_, ProxyError>(UpstreamMessage::from(message)))
        });
    let stream = stream.filter_map(|next| {
        future::ready(match next {
            Ok(message) => RelayMessage::from_upstream(message).map(Ok),
            Err(e) => Some(Err(ProxyError::relay(Side::Upstream, e))),
        })
    });
    (sink, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downstream_close_frame_survives_both_hops() {
        let downstream = DownstreamMessage::Close(Some(DownstreamCloseFrame {
            code: 4001,
            reason: Utf8Bytes::from_static("reload"),
        }));
        let relay = RelayMessage::from(downstream);
        assert_eq!(
            relay,
            RelayMessage::Close(Some(CloseReason {
                code: 4001,
                reason: "reload".into()
            }))
        );

        match UpstreamMessage::from(relay) {
            UpstreamMessage::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), 4001);
                assert_eq!(frame.reason.as_str(), "reload");
            }
            other => panic!("unexpected upstream message {:?}", other),
        }
    }

    #[test]
    fn test_upstream_text_reaches_downstream_unchanged() {
        let relay = RelayMessage::from_upstream(UpstreamMessage::text("pong")).unwrap();
        assert_eq!(relay, RelayMessage::Text("pong".into()));
        match DownstreamMessage::from(relay) {
            DownstreamMessage::Text(text) => assert_eq!(text.as_str(), "pong"),
            other => panic!("unexpected downstream message {:?}", other),
        }
    }

    #[test]
    fn test_binary_payload_is_not_copied_into_text() {
        let payload = Bytes::from_static(&[0, 159, 146, 150]);
        let relay = RelayMessage::from(DownstreamMessage::Binary(payload.clone()));
        assert_eq!(relay.kind(), "binary");
        assert!(matches!(UpstreamMessage::from(relay), UpstreamMessage::Binary(b) if b == payload));
    }

    #[test]
    fn test_bare_close_has_no_reason() {
        let relay = RelayMessage::from_upstream(UpstreamMessage::Close(None)).unwrap();
        assert!(relay.is_close());
        assert!(matches!(DownstreamMessage::from(relay), DownstreamMessage::Close(None)));
    }
}
