//! Connection to the remote analysis source.
//!
//! State machine: `Disconnected -> Connecting -> Connected`, and on any
//! failure `Backoff` (fixed delay) back to `Connecting`. The channel owns
//! its single retry timer. Outbound traffic is the full move sequence, sent
//! only when it differs from the last sequence that was actually delivered.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::time::Sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::candidates::RawCandidate;
use crate::error::OverlayError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ConnectFuture = Pin<Box<dyn Future<Output = Result<WsStream, OverlayError>>>>;

/// Fixed delay before every reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Backoff,
    Connecting,
    Connected,
}

/// What the channel observed; returned from [`SyncChannel::next_event`].
#[derive(Debug)]
pub enum ChannelEvent {
    Connected,
    ConnectFailed(OverlayError),
    Message(String),
    Closed(Option<OverlayError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Same sequence as the last delivered one.
    Unchanged,
    Sent,
    /// Not connected; nothing queued, a later sample will carry it.
    Deferred,
    Failed,
}

enum Link {
    Disconnected,
    Backoff(Pin<Box<Sleep>>),
    Connecting(ConnectFuture),
    Connected(WsStream),
}

/// Remembers the last delivered payload.
#[derive(Debug, Default)]
pub struct PushGate {
    last_sent: Option<String>,
}

impl PushGate {
    pub fn is_changed(&self, payload: &str) -> bool {
        self.last_sent.as_deref() != Some(payload)
    }

    pub fn record_sent(&mut self, payload: String) {
        self.last_sent = Some(payload);
    }

    pub fn last_sent(&self) -> Option<&str> {
        self.last_sent.as_deref()
    }
}

pub struct SyncChannel {
    url: String,
    reconnect_delay: Duration,
    link: Link,
    gate: PushGate,
}

impl SyncChannel {
    pub fn new(url: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            url: url.into(),
            reconnect_delay,
            link: Link::Disconnected,
            gate: PushGate::default(),
        }
    }

    pub fn state(&self) -> ChannelState {
        match self.link {
            Link::Disconnected => ChannelState::Disconnected,
            Link::Backoff(_) => ChannelState::Backoff,
            Link::Connecting(_) => ChannelState::Connecting,
            Link::Connected(_) => ChannelState::Connected,
        }
    }

    pub fn gate(&self) -> &PushGate {
        &self.gate
    }

    pub fn start(&mut self) {
        self.ensure_connecting();
    }

    /// Begin connecting unless an attempt is already scheduled, pending or
    /// open. Returns whether a new attempt was started.
    pub fn ensure_connecting(&mut self) -> bool {
        if !matches!(self.link, Link::Disconnected) {
            return false;
        }
        self.begin_connect();
        true
    }

    fn begin_connect(&mut self) {
        let url = self.url.clone();
        info!(url = %url, "Connecting to analysis source");
        self.link = Link::Connecting(Box::pin(async move {
            let (stream, _response) = connect_async(url).await?;
            Ok::<_, OverlayError>(stream)
        }));
    }

    fn schedule_retry(&mut self) {
        debug!(delay_ms = self.reconnect_delay.as_millis() as u64, "Scheduling reconnect");
        self.link = Link::Backoff(Box::pin(tokio::time::sleep(self.reconnect_delay)));
    }

    /// Drive the connection and wait for the next observable event.
    ///
    /// Cancel-safe: all in-flight state lives in `self`, so dropping the
    /// future (e.g. from a `select!`) loses nothing. Pending forever while
    /// disconnected and not started.
    pub async fn next_event(&mut self) -> ChannelEvent {
        loop {
            match &mut self.link {
                Link::Disconnected => std::future::pending::<()>().await,
                Link::Backoff(delay) => {
                    delay.as_mut().await;
                    self.begin_connect();
                }
                Link::Connecting(attempt) => {
                    let result = attempt.as_mut().await;
                    return match result {
                        Ok(stream) => {
                            info!(url = %self.url, "Connected to analysis source");
                            self.link = Link::Connected(stream);
                            ChannelEvent::Connected
                        }
                        Err(e) => {
                            warn!(error = %e, "Connection attempt failed");
                            self.schedule_retry();
                            ChannelEvent::ConnectFailed(e)
                        }
                    };
                }
                Link::Connected(stream) => match stream.next().await {
                    Some(Ok(Message::Text(text))) => return ChannelEvent::Message(text.to_string()),
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Analysis source closed the connection");
                        self.schedule_retry();
                        return ChannelEvent::Closed(None);
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "Connection error");
                        self.schedule_retry();
                        return ChannelEvent::Closed(Some(e.into()));
                    }
                },
            }
        }
    }

    /// Send `moves` if it differs from the last delivered sequence.
    pub async fn push(&mut self, moves: &[String]) -> PushOutcome {
        let payload = match serde_json::to_string(moves) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Failed to serialise move sequence");
                return PushOutcome::Failed;
            }
        };
        if !self.gate.is_changed(&payload) {
            return PushOutcome::Unchanged;
        }

        let Link::Connected(stream) = &mut self.link else {
            self.ensure_connecting();
            return PushOutcome::Deferred;
        };
        match stream.send(Message::Text(payload.clone().into())).await {
            Ok(()) => {
                debug!(plies = moves.len(), "Pushed move sequence");
                self.gate.record_sent(payload);
                PushOutcome::Sent
            }
            Err(e) => {
                warn!(error = %e, "Failed to push move sequence");
                self.schedule_retry();
                PushOutcome::Failed
            }
        }
    }

    /// Close any open connection and stay disconnected.
    pub async fn stop(&mut self) {
        if let Link::Connected(stream) = &mut self.link {
            let _ = stream.close(None).await;
        }
        self.link = Link::Disconnected;
    }
}

// ---- Inbound messages ----

/// A parsed message from the analysis source.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Clear every annotation.
    Reset,
    /// Best-first candidate entries (possibly empty).
    Candidates(Vec<RawCandidate>),
    /// The source refused the last sequence.
    Rejected(String),
}

#[derive(Deserialize)]
struct AnalysisReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    pvs: Option<Vec<RawCandidate>>,
    #[serde(default)]
    moves: Option<Vec<RawCandidate>>,
}

pub fn parse_inbound(text: &str) -> Result<Inbound, OverlayError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(OverlayError::UnexpectedPayload(format!(
            "expected an object, got {}",
            truncate(text, 64)
        )));
    }
    let reply: AnalysisReply = serde_json::from_value(value)?;
    if reply.status.as_deref() == Some("reset") {
        return Ok(Inbound::Reset);
    }
    if let Some(error) = reply.error {
        return Ok(Inbound::Rejected(error));
    }
    let candidates = [reply.pvs, reply.moves]
        .into_iter()
        .flatten()
        .find(|list| !list.is_empty())
        .unwrap_or_default();
    Ok(Inbound::Candidates(candidates))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_suppresses_repeats() {
        let mut gate = PushGate::default();
        assert!(gate.is_changed("[]"));
        gate.record_sent("[\"e4\"]".into());
        assert!(!gate.is_changed("[\"e4\"]"));
        assert!(gate.is_changed("[\"e4\",\"e5\"]"));
    }

    #[test]
    fn test_parse_reset() {
        assert_eq!(parse_inbound(r#"{"status": "reset"}"#).unwrap(), Inbound::Reset);
    }

    #[test]
    fn test_parse_first_non_empty_list() {
        let msg = r#"{"pvs": [], "moves": [{"move": "e2e4", "score_cp": 30}], "fen": "x"}"#;
        match parse_inbound(msg).unwrap() {
            Inbound::Candidates(list) => assert_eq!(list.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
        let msg = r#"{"pvs": ["d2d4"], "moves": ["e2e4", "c2c4"]}"#;
        match parse_inbound(msg).unwrap() {
            Inbound::Candidates(list) => assert_eq!(list, vec![RawCandidate::Bare("d2d4".into())]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_without_lists_is_empty() {
        assert_eq!(
            parse_inbound(r#"{"fen": "8/8/8/8/8/8/8/8 w - - 0 1"}"#).unwrap(),
            Inbound::Candidates(vec![])
        );
    }

    #[test]
    fn test_parse_error_reply() {
        assert_eq!(
            parse_inbound(r#"{"error": "Invalid JSON"}"#).unwrap(),
            Inbound::Rejected("Invalid JSON".into())
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_inbound("not json").is_err());
        assert!(matches!(
            parse_inbound("[1, 2]"),
            Err(OverlayError::UnexpectedPayload(_))
        ));
        assert!(parse_inbound(r#"{"pvs": 5}"#).is_err());
    }

    #[tokio::test]
    async fn test_push_while_disconnected_is_deferred_and_not_recorded() {
        // Nothing listens on port 9 locally; the attempt is only started, not awaited
        let mut channel = SyncChannel::new("ws://127.0.0.1:9", RECONNECT_DELAY);
        assert_eq!(channel.state(), ChannelState::Disconnected);
        let moves = vec!["e4".to_string()];
        assert_eq!(channel.push(&moves).await, PushOutcome::Deferred);
        assert_eq!(channel.state(), ChannelState::Connecting);
        assert!(channel.gate().last_sent().is_none());
        // A second attempt is not started while one is pending
        assert!(!channel.ensure_connecting());
    }
}
