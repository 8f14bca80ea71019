//! Typed error definitions for the crawler.
//!
//! Three classes, matching how far an error is allowed to travel:
//!
//! - [`CrawlError`] reaches the caller of `start()`. Structural problems only.
//! - [`ConnectionError`] is transient. Connection managers absorb it and retry.
//! - [`DecodeError`] concerns a single frame. It is counted and the frame skipped.

use thiserror::Error;

/// Errors surfaced to the code that starts a crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Unknown exchange, or an exchange/market/message combination the
    /// adapter does not declare.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Invalid request shape, e.g. an interval on a non-candlestick
    /// subscription.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CrawlError {
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

/// Transient network or protocol failure. Recovered by reconnect/backoff.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// TCP/TLS/WebSocket handshake failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Writing to the transport failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Reading from the transport failed.
    #[error("read failed: {0}")]
    Read(String),

    /// REST request failed or returned a non-success status.
    #[error("http error: {0}")]
    Http(String),

    /// The operation did not finish in time.
    #[error("timed out")]
    Timeout,

    /// The peer closed the connection.
    #[error("connection closed")]
    Closed,
}

/// Failure to decode one frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("unknown channel `{0}`")]
    UnknownChannel(String),

    /// The exchange reported an error in-band (e.g. a rejected subscription).
    #[error("exchange error: {0}")]
    Exchange(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let e = CrawlError::not_supported("exchange=foo market_type=spot");
        assert_eq!(e.to_string(), "not supported: exchange=foo market_type=spot");

        let e = DecodeError::MissingField("stream");
        assert_eq!(e.to_string(), "missing field `stream`");
    }

    #[test]
    fn json_error_converts() {
        let err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let e: DecodeError = err.into();
        assert!(matches!(e, DecodeError::Json(_)));
    }
}
