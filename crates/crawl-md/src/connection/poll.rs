//! Periodic REST poller.
//!
//! One poller per poll-delivered subscription. Ticks fire on a fixed
//! interval starting immediately; a tick that falls due while the previous
//! fetch is still running is skipped, never queued. Failed fetches are
//! retried with backoff only while the retry still fits before the next
//! tick.

use std::sync::Arc;
use std::time::Duration;

use crawl_core::backoff::Backoff;
use crawl_core::time_util::ReceiptClock;
use crawl_core::Subscription;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{ConnContext, DecodeDiagnostics, PollState};
use crate::adapter::PollRequest;
use crate::dispatch::ConnectionSink;
use crate::normalizer::{Normalizer, SymbolCache};

pub struct Poller {
    ctx: ConnContext,
    label: String,
    subscription: Subscription,
    interval: Duration,
    normalizer: Normalizer,
    sink: ConnectionSink,
    diagnostics: DecodeDiagnostics,
    clock: ReceiptClock,
    /// Listed symbols for wildcard subscriptions without a bulk endpoint,
    /// with the time they were fetched.
    listed: Option<(Instant, Vec<String>)>,
    state: PollState,
}

impl Poller {
    pub fn new(ctx: ConnContext, label: String, subscription: Subscription, interval: Duration) -> Self {
        let mut symbols = SymbolCache::new();
        symbols.extend(subscription.symbol.as_deref());
        let normalizer = Normalizer::new(ctx.exchange(), ctx.market_type, symbols);
        let sink = ctx.dispatch.sink(&label);
        let diagnostics = DecodeDiagnostics::new(ctx.config.decode_log_interval());

        Self {
            ctx,
            label,
            subscription,
            interval,
            normalizer,
            sink,
            diagnostics,
            clock: ReceiptClock::new(),
            listed: None,
            state: PollState::Idle,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        let cancel = self.ctx.cancel.clone();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("[{}] polling every {:?}", self.label, self.interval);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let next_tick = Instant::now() + self.interval;
            self.set_state(PollState::Fetching);
            for request in self.requests().await {
                if cancel.is_cancelled() {
                    break;
                }
                self.fetch_with_retry(&request, next_tick).await;
            }
            self.set_state(PollState::Idle);
        }

        info!("[{}] stopped", self.label);
    }

    /// Requests for one tick.
    async fn requests(&mut self) -> Vec<PollRequest> {
        let adapter = Arc::clone(&self.ctx.adapter);
        let market_type = self.ctx.market_type;

        if let Some(request) = adapter.poll_request(market_type, &self.subscription) {
            return vec![request];
        }
        if !self.subscription.is_wildcard() {
            warn!("[{}] adapter produced no request for {:?}", self.label, self.subscription);
            return Vec::new();
        }

        let refresh = self.ctx.config.symbol_refresh();
        let stale = self.listed.as_ref().is_none_or(|(at, _)| at.elapsed() >= refresh);
        if stale {
            let fetched = tokio::select! {
                _ = self.ctx.cancel.cancelled() => return Vec::new(),
                r = adapter.fetch_symbols(market_type, self.ctx.config.http_timeout()) => r,
            };
            match fetched {
                Ok(symbols) => {
                    info!("[{}] {} listed symbols", self.label, symbols.len());
                    self.normalizer.symbols_mut().extend(symbols.iter().map(String::as_str));
                    self.listed = Some((Instant::now(), symbols));
                }
                Err(e) => {
                    self.ctx.counters.record_fetch_error();
                    warn!("[{}] symbol listing failed: {e}", self.label);
                }
            }
        }

        match &self.listed {
            Some((_, symbols)) => symbols
                .iter()
                .filter_map(|s| adapter.poll_request(market_type, &self.subscription.for_symbol(s)))
                .collect(),
            None => Vec::new(),
        }
    }

    async fn fetch_with_retry(&mut self, request: &PollRequest, next_tick: Instant) {
        let adapter = Arc::clone(&self.ctx.adapter);
        let timeout = self.ctx.config.http_timeout();
        let mut backoff = Backoff::new(adapter.reconnect_policy());

        loop {
            let fetched = tokio::select! {
                _ = self.ctx.cancel.cancelled() => return,
                r = adapter.fetch(request, timeout) => r,
            };
            match fetched {
                Ok(body) => {
                    self.handle_body(request, &body);
                    return;
                }
                Err(e) => {
                    self.ctx.counters.record_fetch_error();
                    let delay = backoff.next_delay();
                    if Instant::now() + delay >= next_tick {
                        warn!("[{}] fetch {} failed: {e}; retrying next tick", self.label, request.url);
                        return;
                    }
                    debug!("[{}] fetch {} failed: {e}; retrying in {delay:?}", self.label, request.url);
                    if !self.ctx.sleep_or_cancel(delay).await {
                        return;
                    }
                }
            }
        }
    }

    fn handle_body(&mut self, request: &PollRequest, body: &[u8]) {
        let received_at = self.clock.stamp();
        match self.ctx.adapter.decode_poll(self.ctx.market_type, request, body) {
            Ok(raws) => {
                for msg in self.normalizer.normalize_all(raws, received_at) {
                    self.sink.push(msg);
                }
            }
            Err(e) => {
                self.ctx.counters.record_decode_error();
                self.diagnostics.report(&self.label, &e);
            }
        }
    }

    fn set_state(&mut self, state: PollState) {
        if self.state != state {
            debug!("[{}] {:?} -> {:?}", self.label, self.state, state);
            self.state = state;
        }
    }
}
