//! # crawl-core
//!
//! Core crate for the market-data crawler, providing:
//!
//! - **Types** (`types`): market/message enums, the `Message` envelope, subscriptions
//! - **Configuration** (`config`): JSON config deserialization
//! - **Error types** (`error`): `CrawlError`, `ConnectionError`, `DecodeError` via thiserror
//! - **Backoff** (`backoff`): capped exponential reconnect delays with jitter
//! - **Transport** (`transport`): the frame-level I/O trait connection managers drive
//! - **WebSocket** (`ws`): tokio-tungstenite transport with keep-alive handling
//! - **HTTP** (`http`): shared reqwest client for REST polling
//! - **Time utilities** (`time_util`): epoch timestamps and the per-connection receipt clock
//! - **Logging** (`logging`): tracing-based structured logging

pub mod backoff;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod time_util;
pub mod transport;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use types::*;
