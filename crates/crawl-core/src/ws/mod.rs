//! WebSocket transport with keep-alive support.

pub mod client;

pub use client::{PingPayload, WsTransport};
