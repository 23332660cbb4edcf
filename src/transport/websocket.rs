//! The real transport: a blocking websocket connection.

use std::collections::VecDeque;
use std::net::TcpStream;
use std::time::Duration;

use tracing::debug;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Error as WsError, Message, WebSocket};

use crate::error::{Result, StreamError};
use crate::transport::{Transport, TransportEvent};

/// About 60 seconds of auto-retry.
const DEFAULT_BACKOFF: &[u64] = &[0, 1, 2, 4, 8, 10, 10, 10, 15];

#[derive(Debug)]
enum Phase {
    Idle,
    /// `connect()` was called; the handshake runs on the next event pull.
    Opening,
    Open,
    Finished,
}

/// Websocket-backed [`Transport`].
///
/// The handshake is deferred to the first `next_event()` pull so that all
/// blocking work, including connection establishment, happens inside the
/// stream's control loop.
pub struct WebSocketTransport {
    url: String,
    ws: Option<WebSocket<MaybeTlsStream<TcpStream>>>,
    phase: Phase,
    pending: VecDeque<TransportEvent>,
    backoffs: Vec<u64>,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ws: None,
            phase: Phase::Idle,
            pending: VecDeque::new(),
            backoffs: DEFAULT_BACKOFF.to_vec(),
        }
    }

    /// Replace the default reconnect schedule (delays in seconds).
    pub fn with_backoff(mut self, schedule: Vec<u64>) -> Self {
        self.backoffs = schedule;
        self
    }

    fn open(&mut self) -> TransportEvent {
        match tungstenite::connect(self.url.as_str()) {
            Ok((ws, _response)) => {
                debug!(url = %self.url, "websocket connected");
                self.ws = Some(ws);
                self.phase = Phase::Open;
                self.pending.push_back(TransportEvent::Ready);
                TransportEvent::Connected
            }
            Err(WsError::Http(response)) => {
                self.phase = Phase::Finished;
                TransportEvent::Rejected(format!(
                    "upgrade rejected with status {}",
                    response.status()
                ))
            }
            Err(e) => {
                self.phase = Phase::Finished;
                TransportEvent::ConnectFailed(e.to_string())
            }
        }
    }

    fn read(&mut self) -> TransportEvent {
        loop {
            let Some(ws) = self.ws.as_mut() else {
                self.phase = Phase::Finished;
                return TransportEvent::Disconnected;
            };
            match ws.read() {
                Ok(Message::Text(text)) => return TransportEvent::Text(text),
                Ok(Message::Close(_)) => return TransportEvent::Closing,
                // control and binary frames carry nothing for us
                Ok(_) => continue,
                Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => {
                    self.ws = None;
                    self.phase = Phase::Finished;
                    self.pending.push_back(TransportEvent::Disconnected);
                    return TransportEvent::Closed;
                }
                Err(e) => {
                    self.ws = None;
                    self.phase = Phase::Finished;
                    self.pending.push_back(TransportEvent::Disconnected);
                    return TransportEvent::ProtocolError(e.to_string());
                }
            }
        }
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self) {
        if let Some(mut ws) = self.ws.take() {
            let _ = ws.close(None);
        }
        self.pending.clear();
        self.pending.push_back(TransportEvent::Connecting);
        self.phase = Phase::Opening;
    }

    fn next_event(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        match self.phase {
            Phase::Opening => Some(self.open()),
            Phase::Open => Some(self.read()),
            Phase::Idle | Phase::Finished => None,
        }
    }

    fn send_text(&mut self, text: &str) -> Result<()> {
        let ws = self
            .ws
            .as_mut()
            .ok_or_else(|| StreamError::Transport("websocket is not connected".to_string()))?;
        ws.send(Message::Text(text.to_string()))
            .map_err(|e| StreamError::Transport(e.to_string()))
    }

    fn close(&mut self) {
        if let Some(ws) = self.ws.as_mut() {
            // Best effort: start the close handshake; the remaining reads
            // drain through next_event() until the peer acks.
            let _ = ws.close(None);
        } else {
            self.phase = Phase::Finished;
        }
    }

    fn backoff(&self, retries: usize) -> Option<Duration> {
        self.backoffs.get(retries).map(|s| Duration::from_secs(*s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule_exhausts() {
        let transport = WebSocketTransport::new("ws://localhost:9");
        assert_eq!(transport.backoff(0), Some(Duration::from_secs(0)));
        assert_eq!(transport.backoff(8), Some(Duration::from_secs(15)));
        assert_eq!(transport.backoff(9), None);
    }

    #[test]
    fn test_custom_backoff() {
        let transport = WebSocketTransport::new("ws://localhost:9").with_backoff(vec![3]);
        assert_eq!(transport.backoff(0), Some(Duration::from_secs(3)));
        assert_eq!(transport.backoff(1), None);
    }

    #[test]
    fn test_connect_failure_surfaces_as_event() {
        // Nothing listens on this port; the handshake must fail as an event,
        // not a panic or error return.
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:1/stream");
        transport.connect();
        assert_eq!(transport.next_event(), Some(TransportEvent::Connecting));
        match transport.next_event() {
            Some(TransportEvent::ConnectFailed(_)) => {}
            other => panic!("expected ConnectFailed, got {other:?}"),
        }
        assert_eq!(transport.next_event(), None);
    }

    #[test]
    fn test_send_without_connection_errors() {
        let mut transport = WebSocketTransport::new("ws://localhost:9");
        assert!(transport.send_text("{}").is_err());
    }
}
