//! "All symbols" resolution for streaming subscriptions.
//!
//! Exchanges without a native all-symbols topic are covered by listing their
//! symbols over REST and subscribing to each one. The listing is refreshed
//! periodically; newly listed symbols get fresh stream managers, delisted
//! ones simply go quiet.

use ahash::AHashSet;
use crawl_core::backoff::Backoff;
use crawl_core::Subscription;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::ConnContext;
use super::stream::StreamManager;
use crate::adapter::StreamEndpoint;

pub struct SymbolDiscovery {
    ctx: ConnContext,
    label: String,
    endpoint: StreamEndpoint,
    /// Wildcard subscriptions, narrowed per discovered symbol.
    templates: Vec<Subscription>,
    known: AHashSet<String>,
    children: Vec<JoinHandle<()>>,
}

impl SymbolDiscovery {
    pub fn new(ctx: ConnContext, label: String, endpoint: StreamEndpoint, templates: Vec<Subscription>) -> Self {
        Self { ctx, label, endpoint, templates, known: AHashSet::new(), children: Vec::new() }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        let cancel = self.ctx.cancel.clone();
        let adapter = self.ctx.adapter.clone();
        let market_type = self.ctx.market_type;
        let mut backoff = Backoff::new(adapter.reconnect_policy());

        loop {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => break,
                r = adapter.fetch_symbols(market_type, self.ctx.config.http_timeout()) => r,
            };
            let wait = match fetched {
                Ok(symbols) => {
                    backoff.reset();
                    self.add_symbols(symbols);
                    self.ctx.config.symbol_refresh()
                }
                Err(e) => {
                    self.ctx.counters.record_fetch_error();
                    let delay = backoff.next_delay();
                    warn!("[{}] symbol listing failed: {e}; retrying in {delay:?}", self.label);
                    delay
                }
            };
            if !self.ctx.sleep_or_cancel(wait).await {
                break;
            }
        }

        // Children observe the same token; wait for them to close their
        // transports.
        for child in self.children.drain(..) {
            let _ = child.await;
        }
        info!("[{}] stopped", self.label);
    }

    fn add_symbols(&mut self, symbols: Vec<String>) {
        let fresh: Vec<String> = symbols.into_iter().filter(|s| self.known.insert(s.clone())).collect();
        if fresh.is_empty() {
            debug!("[{}] no new symbols ({} known)", self.label, self.known.len());
            return;
        }
        info!("[{}] {} new symbol(s), {} known", self.label, fresh.len(), self.known.len());

        let subscriptions: Vec<Subscription> = fresh
            .iter()
            .flat_map(|symbol| self.templates.iter().map(move |t| t.for_symbol(symbol)))
            .collect();

        let per_conn = self.ctx.adapter.max_subscriptions_per_connection().max(1);
        for chunk in subscriptions.chunks(per_conn) {
            let label = format!("{}_{}", self.label, self.children.len());
            let manager = StreamManager::new(self.ctx.clone(), label, self.endpoint.clone(), chunk.to_vec());
            self.children.push(manager.spawn());
        }
    }
}
