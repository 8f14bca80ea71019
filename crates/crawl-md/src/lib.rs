//! # crawl-md
//!
//! Realtime market-data crawler engine.
//!
//! ## Architecture
//!
//! A [`session::CrawlSession`] resolves an [`adapter::ExchangeAdapter`] from the
//! [`registry::AdapterRegistry`], then runs one connection manager per
//! transport (streaming socket, REST poller or symbol discovery). Managers
//! decode frames through the adapter, wrap them with a per-connection
//! [`normalizer::Normalizer`] and push them into the [`dispatch`] pipeline,
//! which hands them to the consumer callback on its own thread.
//!
//! ## Modules
//!
//! - [`api`]: `crawl_trade`, `crawl_candlestick`, ... one entry point per category
//! - [`session`]: session lifecycle, planning, stop/drain
//! - [`connection`]: stream, poll and discovery managers
//! - [`dispatch`]: bounded per-connection buffers, drop-oldest
//! - [`binance`], [`okx`], [`bybit`]: exchange adapters
//! - [`mock`]: scripted adapter for tests

pub mod adapter;
pub mod api;
pub mod binance;
pub mod bybit;
pub mod connection;
pub mod dispatch;
pub mod json_util;
pub mod mock;
pub mod normalizer;
pub mod okx;
pub mod registry;
pub mod session;
pub mod stats;

pub use adapter::{CapabilityDescriptor, Delivery, ExchangeAdapter};
pub use api::*;
pub use dispatch::OnMessage;
pub use registry::AdapterRegistry;
pub use session::{CrawlRequest, CrawlSession, SessionState};
pub use stats::SessionStats;
