//! Persistent streaming connection manager.
//!
//! Each `StreamManager` runs as a tokio task that:
//! 1. Connects through the adapter (`Connecting`).
//! 2. Sends the adapter's subscription messages (`Subscribing`).
//! 3. Reads frames, decodes, normalizes and pushes them to its dispatch
//!    buffer; sends periodic pings if the endpoint asks for them (`Streaming`).
//! 4. On error or close, waits out the adapter's backoff and reconnects.
//!
//! Cancellation is checked before every connect and raced against every
//! await, so `stop()` is observed within one scheduling round.

use ahash::AHashSet;
use crawl_core::backoff::Backoff;
use crawl_core::time_util::ReceiptClock;
use crawl_core::transport::{Transport, WireMessage};
use crawl_core::{MessageType, Subscription};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{ConnContext, ConnState, DecodeDiagnostics};
use crate::adapter::StreamEndpoint;
use crate::dispatch::ConnectionSink;
use crate::normalizer::{Normalizer, SymbolCache};

/// Why one connect-subscribe-stream round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// Caller-initiated stop; do not reconnect.
    Cancelled,
    /// Unexpected disconnect or failed connect; reconnect after backoff.
    Disconnected,
}

enum Event {
    Cancelled,
    Frame(Option<Result<Vec<u8>, crawl_core::error::ConnectionError>>),
    Ping(WireMessage),
}

/// Owns one streaming transport and everything decoded from it.
pub struct StreamManager {
    ctx: ConnContext,
    label: String,
    endpoint: StreamEndpoint,
    subscriptions: Vec<Subscription>,
    wanted: AHashSet<MessageType>,
    normalizer: Normalizer,
    sink: ConnectionSink,
    diagnostics: DecodeDiagnostics,
    clock: ReceiptClock,
    state: ConnState,
}

impl StreamManager {
    pub fn new(ctx: ConnContext, label: String, endpoint: StreamEndpoint, subscriptions: Vec<Subscription>) -> Self {
        let mut symbols = SymbolCache::new();
        symbols.extend(subscriptions.iter().filter_map(|s| s.symbol.as_deref()));
        let normalizer = Normalizer::new(ctx.exchange(), ctx.market_type, symbols);
        let wanted = subscriptions.iter().map(|s| s.msg_type).collect();
        let sink = ctx.dispatch.sink(&label);
        let diagnostics = DecodeDiagnostics::new(ctx.config.decode_log_interval());

        Self {
            ctx,
            label,
            endpoint,
            subscriptions,
            wanted,
            normalizer,
            sink,
            diagnostics,
            clock: ReceiptClock::new(),
            state: ConnState::Disconnected,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Connection loop. Runs connect and stream rounds until cancelled.
    pub async fn run(mut self) {
        let mut backoff = Backoff::new(self.ctx.adapter.reconnect_policy());
        let mut first = true;

        info!(
            "[{}] starting: {} subscription(s) on {}",
            self.label,
            self.subscriptions.len(),
            self.endpoint.url
        );

        loop {
            if self.ctx.cancel.is_cancelled() {
                break;
            }
            if !first {
                let delay = backoff.next_delay();
                self.ctx.counters.record_reconnect();
                info!("[{}] reconnecting in {delay:?}", self.label);
                if !self.ctx.sleep_or_cancel(delay).await {
                    break;
                }
            }
            first = false;

            if self.connect_and_stream(&mut backoff).await == Exit::Cancelled {
                break;
            }
            self.set_state(ConnState::Disconnected);
        }

        self.set_state(ConnState::Disconnected);
        info!("[{}] stopped", self.label);
    }

    async fn connect_and_stream(&mut self, backoff: &mut Backoff) -> Exit {
        let cancel = self.ctx.cancel.clone();

        self.set_state(ConnState::Connecting);
        self.ctx.counters.record_connect_attempt();
        let connected = tokio::select! {
            _ = cancel.cancelled() => return Exit::Cancelled,
            r = self.ctx.adapter.connect(&self.endpoint) => r,
        };
        let mut transport = match connected {
            Ok(t) => t,
            Err(e) => {
                warn!("[{}] {e}", self.label);
                return Exit::Disconnected;
            }
        };
        info!("[{}] connected", self.label);

        self.set_state(ConnState::Subscribing);
        let requests = self.ctx.adapter.build_subscription_request(self.ctx.market_type, &self.subscriptions);
        for request in requests {
            debug!("[{}] subscribing: {request:?}", self.label);
            let sent = tokio::select! {
                _ = cancel.cancelled() => {
                    transport.close().await;
                    return Exit::Cancelled;
                }
                r = transport.send(request) => r,
            };
            if let Err(e) = sent {
                warn!("[{}] subscribe failed: {e}", self.label);
                transport.close().await;
                return Exit::Disconnected;
            }
        }

        self.set_state(ConnState::Streaming);
        let exit = self.stream(transport.as_mut(), backoff).await;
        transport.close().await;
        exit
    }

    async fn stream(&mut self, transport: &mut dyn Transport, backoff: &mut Backoff) -> Exit {
        let cancel = self.ctx.cancel.clone();
        let mut ping = self.endpoint.ping.as_ref().map(|p| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + p.interval, p.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            (interval, p.payload.to_wire())
        });

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => Event::Cancelled,
                frame = transport.next_frame() => Event::Frame(frame),
                msg = next_ping(&mut ping) => Event::Ping(msg),
            };

            match event {
                Event::Cancelled => {
                    info!("[{}] shutdown signal received", self.label);
                    return Exit::Cancelled;
                }
                Event::Frame(Some(Ok(bytes))) => {
                    // Acks and pongs carry no records and leave the streak alone.
                    if self.handle_frame(&bytes) > 0 {
                        backoff.reset();
                    }
                }
                Event::Frame(Some(Err(e))) => {
                    warn!("[{}] {e}", self.label);
                    return Exit::Disconnected;
                }
                Event::Frame(None) => {
                    warn!("[{}] stream ended", self.label);
                    return Exit::Disconnected;
                }
                Event::Ping(msg) => {
                    if let Err(e) = transport.send(msg).await {
                        warn!("[{}] ping failed: {e}", self.label);
                        return Exit::Disconnected;
                    }
                }
            }
        }
    }

    /// Decode one frame and enqueue its messages. Returns the number of
    /// records the frame held, zero for control frames and decode errors.
    fn handle_frame(&mut self, bytes: &[u8]) -> usize {
        let received_at = self.clock.stamp();
        match self.ctx.adapter.decode_frame(self.ctx.market_type, bytes) {
            Ok(raws) => {
                let records = raws.len();
                for raw in raws {
                    if self.wanted.contains(&raw.msg_type) {
                        self.sink.push(self.normalizer.normalize(raw, received_at));
                    }
                }
                records
            }
            Err(e) => {
                self.ctx.counters.record_decode_error();
                self.diagnostics.report(&self.label, &e);
                0
            }
        }
    }

    fn set_state(&mut self, state: ConnState) {
        if self.state != state {
            debug!("[{}] {:?} -> {:?}", self.label, self.state, state);
            self.state = state;
        }
    }
}

async fn next_ping(ping: &mut Option<(Interval, WireMessage)>) -> WireMessage {
    match ping {
        Some((interval, msg)) => {
            interval.tick().await;
            msg.clone()
        }
        None => std::future::pending().await,
    }
}
