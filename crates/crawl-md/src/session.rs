//! Crawl session: one exchange, one market, a set of subscriptions.
//!
//! `start()` validates the request, resolves the adapter and spawns:
//! - one [`StreamManager`] per endpoint group of fixed-symbol subscriptions,
//!   chunked by the adapter's per-connection limit;
//! - one [`SymbolDiscovery`] per endpoint for "all symbols" subscriptions the
//!   exchange cannot serve with a single topic;
//! - one [`Poller`] per poll-delivered subscription;
//! - the dispatch thread and, when a duration is set, a deadline timer.
//!
//! `stop()` cancels every manager, waits up to the grace period for them to
//! close their transports, then lets the dispatch thread drain what is left.

use std::sync::Arc;
use std::time::Duration;

use crawl_core::config::CrawlerConfig;
use crawl_core::error::CrawlError;
use crawl_core::{MarketType, MessageType, Subscription};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapter::{Delivery, ExchangeAdapter, StreamEndpoint};
use crate::connection::ConnContext;
use crate::connection::discovery::SymbolDiscovery;
use crate::connection::poll::Poller;
use crate::connection::stream::StreamManager;
use crate::dispatch::{self, Dispatcher, OnMessage};
use crate::registry::AdapterRegistry;
use crate::stats::{Counters, SessionStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// What to crawl.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRequest {
    pub exchange: String,
    pub market_type: MarketType,
    pub subscriptions: Vec<Subscription>,
    /// Run time; zero runs until stopped.
    pub duration: Duration,
}

impl CrawlRequest {
    pub fn new(exchange: impl Into<String>, market_type: MarketType, subscriptions: Vec<Subscription>) -> Self {
        Self { exchange: exchange.into(), market_type, subscriptions, duration: Duration::ZERO }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// e.g. `binance_spot_trade+bbo`
    pub fn label(&self) -> String {
        let mut kinds: Vec<&str> = self.subscriptions.iter().map(|s| s.msg_type.as_str()).collect();
        kinds.sort_unstable();
        kinds.dedup();
        format!("{}_{}_{}", self.exchange.to_lowercase(), self.market_type, kinds.join("+"))
    }
}

/// Work derived from a validated request.
#[derive(Debug, Default)]
struct Plan {
    /// Fixed-symbol subscriptions grouped by endpoint.
    streams: Vec<(StreamEndpoint, Vec<Subscription>)>,
    /// Wildcard subscriptions needing REST symbol discovery, by endpoint.
    discoveries: Vec<(StreamEndpoint, Vec<Subscription>)>,
    polls: Vec<(Subscription, Duration)>,
}

fn push_grouped(groups: &mut Vec<(StreamEndpoint, Vec<Subscription>)>, endpoint: StreamEndpoint, sub: Subscription) {
    match groups.iter_mut().find(|(e, _)| e.url == endpoint.url) {
        Some((_, subs)) => {
            if !subs.contains(&sub) {
                subs.push(sub);
            }
        }
        None => groups.push((endpoint, vec![sub])),
    }
}

pub struct CrawlSession {
    label: String,
    request: CrawlRequest,
    registry: Arc<AdapterRegistry>,
    config: Arc<CrawlerConfig>,
    on_msg: Option<OnMessage>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    state: SessionState,
    tasks: Vec<JoinHandle<()>>,
    dispatcher: Option<Dispatcher>,
    deadline: Option<JoinHandle<()>>,
}

impl CrawlSession {
    /// Session against the process-wide registry with default tuning.
    pub fn new(request: CrawlRequest, on_msg: OnMessage) -> Self {
        Self::with_registry(AdapterRegistry::global(), CrawlerConfig::default(), request, on_msg)
    }

    pub fn with_registry(
        registry: Arc<AdapterRegistry>,
        config: CrawlerConfig,
        request: CrawlRequest,
        on_msg: OnMessage,
    ) -> Self {
        Self {
            label: request.label(),
            request,
            registry,
            config: Arc::new(config),
            on_msg: Some(on_msg),
            counters: Arc::new(Counters::new()),
            cancel: CancellationToken::new(),
            state: SessionState::Created,
            tasks: Vec::new(),
            dispatcher: None,
            deadline: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    /// Token that stops the session when cancelled. `wait()` returns once it
    /// fires.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Validate, connect and begin delivery. Must be called inside a tokio
    /// runtime.
    pub fn start(&mut self) -> Result<(), CrawlError> {
        if self.state != SessionState::Created {
            return Err(CrawlError::configuration(format!("[{}] session already started", self.label)));
        }

        let adapter = self.resolve()?;
        let plan = self.plan(adapter.as_ref())?;
        let on_msg = self
            .on_msg
            .take()
            .ok_or_else(|| CrawlError::configuration(format!("[{}] consumer callback missing", self.label)))?;

        let (dispatch, dispatcher) =
            dispatch::spawn(&self.label, self.config.buffer_capacity(), self.counters.clone(), on_msg).map_err(
                |e| CrawlError::configuration(format!("[{}] cannot start dispatch thread: {e}", self.label)),
            )?;
        self.dispatcher = Some(dispatcher);

        let ctx = ConnContext {
            adapter: adapter.clone(),
            market_type: self.request.market_type,
            config: self.config.clone(),
            counters: self.counters.clone(),
            dispatch,
            cancel: self.cancel.clone(),
        };

        let per_conn = adapter.max_subscriptions_per_connection().max(1);
        let mut conn_id = 0usize;
        for (endpoint, subs) in plan.streams {
            for chunk in subs.chunks(per_conn) {
                let manager = StreamManager::new(ctx.clone(), ctx.label(conn_id), endpoint.clone(), chunk.to_vec());
                self.tasks.push(manager.spawn());
                conn_id += 1;
            }
        }
        for (i, (endpoint, templates)) in plan.discoveries.into_iter().enumerate() {
            let discovery = SymbolDiscovery::new(ctx.clone(), ctx.label(format!("discovery{i}")), endpoint, templates);
            self.tasks.push(discovery.spawn());
        }
        for (i, (sub, interval)) in plan.polls.into_iter().enumerate() {
            let poller = Poller::new(ctx.clone(), ctx.label(format!("poll{i}")), sub, interval);
            self.tasks.push(poller.spawn());
        }
        drop(ctx);

        if !self.request.duration.is_zero() {
            let token = self.cancel.clone();
            let duration = self.request.duration;
            let label = self.label.clone();
            self.deadline = Some(tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(duration) => {
                        info!("[{label}] duration {duration:?} elapsed");
                        token.cancel();
                    }
                }
            }));
        }

        self.state = SessionState::Running;
        info!(
            "[{}] running: {} task(s), duration {:?}",
            self.label,
            self.tasks.len(),
            self.request.duration
        );
        Ok(())
    }

    /// Start, run until the duration expires or the cancel handle fires,
    /// then stop.
    pub async fn run(&mut self) -> Result<SessionStats, CrawlError> {
        self.start()?;
        Ok(self.wait().await)
    }

    /// Block until the session is cancelled, then stop it.
    pub async fn wait(&mut self) -> SessionStats {
        if self.state == SessionState::Running {
            self.cancel.cancelled().await;
        }
        self.stop().await
    }

    /// Cancel every manager and drain buffered messages. Idempotent.
    pub async fn stop(&mut self) -> SessionStats {
        match self.state {
            SessionState::Stopped => return self.stats(),
            SessionState::Created => {
                self.cancel.cancel();
                self.state = SessionState::Stopped;
                return self.stats();
            }
            SessionState::Running | SessionState::Stopping => {}
        }

        self.state = SessionState::Stopping;
        info!("[{}] stopping", self.label);
        self.cancel.cancel();

        let grace = self.config.stop_grace();
        let deadline = Instant::now() + grace;
        for task in self.tasks.drain(..) {
            let abort = task.abort_handle();
            if tokio::time::timeout_at(deadline, task).await.is_err() {
                warn!("[{}] connection task did not stop within {grace:?}, aborting", self.label);
                abort.abort();
            }
        }
        if let Some(deadline_task) = self.deadline.take() {
            deadline_task.abort();
        }

        // Producers are gone; the dispatch thread exits once the buffers drain.
        if let Some(dispatcher) = self.dispatcher.take() {
            if !dispatcher.join(grace).await {
                warn!("[{}] consumer did not drain within {grace:?}, detaching", self.label);
            }
        }

        self.state = SessionState::Stopped;
        let stats = self.stats();
        info!("[{}] stopped: {stats}", self.label);
        stats
    }

    fn resolve(&self) -> Result<Arc<dyn ExchangeAdapter>, CrawlError> {
        if self.request.exchange.trim().is_empty() {
            return Err(CrawlError::configuration("exchange must not be empty"));
        }
        if self.request.subscriptions.is_empty() {
            return Err(CrawlError::configuration(format!("[{}] no subscriptions", self.label)));
        }
        for sub in &self.request.subscriptions {
            sub.validate()?;
        }
        self.registry.resolve(&self.request.exchange, self.request.market_type)
    }

    fn plan(&self, adapter: &dyn ExchangeAdapter) -> Result<Plan, CrawlError> {
        let market_type = self.request.market_type;
        let exchange = adapter.exchange();
        let unsupported =
            |msg_type: MessageType| CrawlError::not_supported(format!("{exchange} {market_type} does not offer {msg_type}"));

        let mut plan = Plan::default();
        for sub in &self.request.subscriptions {
            let delivery = adapter.capabilities().delivery(market_type, sub.msg_type).ok_or_else(|| unsupported(sub.msg_type))?;

            if let Some(interval) = sub.interval {
                let supported = adapter.candlestick_intervals(market_type);
                if !supported.is_empty() && !supported.contains(&interval) {
                    return Err(CrawlError::configuration(format!(
                        "{exchange} {market_type} has no {interval}s candlestick (supported: {supported:?})"
                    )));
                }
            }

            match delivery {
                Delivery::Stream => {
                    let endpoint = adapter.stream_endpoint(market_type, sub.msg_type).ok_or_else(|| unsupported(sub.msg_type))?;
                    if sub.is_wildcard() && !adapter.supports_wildcard(market_type, sub.msg_type) {
                        if adapter.symbols_request(market_type).is_none() {
                            return Err(unsupported(sub.msg_type));
                        }
                        push_grouped(&mut plan.discoveries, endpoint, sub.clone());
                    } else {
                        push_grouped(&mut plan.streams, endpoint, sub.clone());
                    }
                }
                Delivery::Poll { interval } => {
                    let servable = adapter.poll_request(market_type, sub).is_some()
                        || (sub.is_wildcard() && adapter.symbols_request(market_type).is_some());
                    if !servable {
                        return Err(unsupported(sub.msg_type));
                    }
                    if !plan.polls.iter().any(|(s, _)| s == sub) {
                        plan.polls.push((sub.clone(), interval));
                    }
                }
            }
        }
        Ok(plan)
    }
}

impl Drop for CrawlSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
