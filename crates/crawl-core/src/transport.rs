//! Frame-level transport abstraction.
//!
//! Connection managers drive a [`Transport`] without knowing whether it is a
//! real WebSocket or a scripted test double. Frames are raw bytes; text frames
//! are handed over as their UTF-8 bytes.

use async_trait::async_trait;

use crate::error::ConnectionError;

/// An outbound message on a streaming transport.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// A text frame (subscription request, JSON ping, `"ping"`).
    Text(String),
    /// A protocol-level ping frame.
    Ping,
}

/// A live, exclusively owned streaming connection.
#[async_trait]
pub trait Transport: Send {
    /// Write one message.
    async fn send(&mut self, msg: WireMessage) -> Result<(), ConnectionError>;

    /// Wait for the next data frame.
    ///
    /// Returns `None` once the peer has closed the stream. Implementations
    /// answer protocol pings internally. Must be cancel-safe: it is polled
    /// inside `tokio::select!`.
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>, ConnectionError>>;

    /// Close the connection. Errors are ignored; the transport is dropped
    /// afterwards either way.
    async fn close(&mut self);
}
