//! Message stream layer for the CodeGame client.
//!
//! Provides the [`Connection`] trait: a single duplex stream of text
//! frames between the client and a game server. The protocol layer above
//! never sees transport framing (ping/pong, binary frames); it only gets
//! whole text messages and an end-of-stream signal.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket client via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;

use std::fmt;
use std::future::Future;

/// Opaque identifier for a connection.
///
/// Only used to tell connections apart in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An open message stream to a game server.
///
/// `send` and `close` may be called concurrently with a pending `recv`
/// and with each other; implementations serialize writes internally so a
/// frame is never interleaved with another one.
///
/// The methods return `impl Future + Send` (rather than being declared
/// `async fn`) so that callers can drive them from a spawned Tokio task.
pub trait Connection: Send + Sync + 'static {
    /// Sends one text frame. Resolves once the frame has been accepted by
    /// the underlying stream.
    fn send(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next text frame from the server.
    ///
    /// Returns `Ok(None)` when the connection is closed (by either side).
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;

    /// Starts a normal closure of the connection with the given reason.
    ///
    /// The close is complete once `recv` returns `Ok(None)`.
    fn close(
        &self,
        reason: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
