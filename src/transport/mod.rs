//! Transport abstraction for the streaming connection.
//!
//! The stream never touches sockets directly; it drives a [`Transport`] and
//! consumes the [`TransportEvent`]s it yields. This keeps all IO behind one
//! seam so the state machine can be tested against a scripted transport.

mod websocket;

pub use websocket::WebSocketTransport;

use std::time::Duration;

use crate::error::Result;

/// A connection-lifecycle or data event produced by a transport.
///
/// One connection attempt yields a sequence of these, ending when
/// [`Transport::next_event`] returns `None`. Failure variants carry a reason
/// string surfaced in the terminal error if reconnection gives up.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Connecting,
    Connected,
    /// Connection is ready for subscribe frames.
    Ready,
    /// An inbound text frame.
    Text(String),
    /// Peer is done writing; we may still write.
    Closing,
    /// No longer safe to write.
    Closed,
    Disconnected,
    ConnectFailed(String),
    Rejected(String),
    ProtocolError(String),
}

/// All IO for a [`Stream`](crate::Stream), pull-driven.
///
/// `connect()` begins an attempt; the outcome arrives as events. A returned
/// `None` from `next_event()` means this connection's event sequence is
/// exhausted and the caller may back off and reconnect.
pub trait Transport {
    /// Begin a connection attempt, closing any previous connection first.
    /// Failures are reported as events, not errors.
    fn connect(&mut self);

    /// Pull the next lifecycle/data event for the current connection.
    /// May block. `None` means the connection is spent.
    fn next_event(&mut self) -> Option<TransportEvent>;

    /// Send one text frame. Only valid once `Ready` has been observed.
    fn send_text(&mut self, text: &str) -> Result<()>;

    /// Tear down the current connection. The remaining events (if any)
    /// should drain promptly after this.
    fn close(&mut self);

    /// Delay before reconnect attempt number `retries`, or `None` when the
    /// schedule is exhausted and the stream should give up.
    fn backoff(&self, retries: usize) -> Option<Duration>;
}
