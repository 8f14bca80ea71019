//! Per-category start-crawl entry points.
//!
//! Each call runs one [`CrawlSession`] against the process-wide registry and
//! returns its counters once `duration_sec` has elapsed. A `duration_sec` of
//! zero runs until the process exits. An empty symbol list means every listed
//! symbol of the market.

use std::time::Duration;

use crawl_core::error::CrawlError;
use crawl_core::{MarketType, MessageType, Subscription};

use crate::dispatch::OnMessage;
use crate::registry::AdapterRegistry;
use crate::session::{CrawlRequest, CrawlSession};
use crate::stats::SessionStats;

/// Candlestick widths crawled when no `(symbol, interval)` list is given.
const DEFAULT_CANDLESTICK_RANGE: std::ops::RangeInclusive<u32> = 10..=180;

fn symbol_subscriptions(msg_type: MessageType, symbols: &[String]) -> Vec<Subscription> {
    if symbols.is_empty() {
        return vec![Subscription::all(msg_type)];
    }
    symbols.iter().map(|s| Subscription::new(s.clone(), msg_type)).collect()
}

fn request(exchange: &str, market_type: MarketType, subscriptions: Vec<Subscription>, duration_sec: u64) -> CrawlRequest {
    CrawlRequest::new(exchange, market_type, subscriptions).with_duration(Duration::from_secs(duration_sec))
}

async fn run(request: CrawlRequest, on_msg: OnMessage) -> Result<SessionStats, CrawlError> {
    CrawlSession::new(request, on_msg).run().await
}

async fn crawl_category(
    msg_type: MessageType,
    exchange: &str,
    market_type: MarketType,
    symbols: &[String],
    on_msg: OnMessage,
    duration_sec: u64,
) -> Result<SessionStats, CrawlError> {
    let subscriptions = symbol_subscriptions(msg_type, symbols);
    run(request(exchange, market_type, subscriptions, duration_sec), on_msg).await
}

/// Trades.
pub async fn crawl_trade(
    exchange: &str,
    market_type: MarketType,
    symbols: &[String],
    on_msg: OnMessage,
    duration_sec: u64,
) -> Result<SessionStats, CrawlError> {
    crawl_category(MessageType::Trade, exchange, market_type, symbols, on_msg, duration_sec).await
}

/// Incremental level-2 order book updates.
pub async fn crawl_l2_event(
    exchange: &str,
    market_type: MarketType,
    symbols: &[String],
    on_msg: OnMessage,
    duration_sec: u64,
) -> Result<SessionStats, CrawlError> {
    crawl_category(MessageType::L2Event, exchange, market_type, symbols, on_msg, duration_sec).await
}

/// Incremental level-3 (per order) book updates.
pub async fn crawl_l3_event(
    exchange: &str,
    market_type: MarketType,
    symbols: &[String],
    on_msg: OnMessage,
    duration_sec: u64,
) -> Result<SessionStats, CrawlError> {
    crawl_category(MessageType::L3Event, exchange, market_type, symbols, on_msg, duration_sec).await
}

/// Level-2 snapshots, polled over REST.
pub async fn crawl_l2_snapshot(
    exchange: &str,
    market_type: MarketType,
    symbols: &[String],
    on_msg: OnMessage,
    duration_sec: u64,
) -> Result<SessionStats, CrawlError> {
    crawl_category(MessageType::L2Snapshot, exchange, market_type, symbols, on_msg, duration_sec).await
}

/// Best bid and offer.
pub async fn crawl_bbo(
    exchange: &str,
    market_type: MarketType,
    symbols: &[String],
    on_msg: OnMessage,
    duration_sec: u64,
) -> Result<SessionStats, CrawlError> {
    crawl_category(MessageType::Bbo, exchange, market_type, symbols, on_msg, duration_sec).await
}

/// Top-K level-2 snapshots pushed over the stream.
pub async fn crawl_l2_topk(
    exchange: &str,
    market_type: MarketType,
    symbols: &[String],
    on_msg: OnMessage,
    duration_sec: u64,
) -> Result<SessionStats, CrawlError> {
    crawl_category(MessageType::L2TopK, exchange, market_type, symbols, on_msg, duration_sec).await
}

/// Level-3 snapshots, polled over REST.
pub async fn crawl_l3_snapshot(
    exchange: &str,
    market_type: MarketType,
    symbols: &[String],
    on_msg: OnMessage,
    duration_sec: u64,
) -> Result<SessionStats, CrawlError> {
    crawl_category(MessageType::L3Snapshot, exchange, market_type, symbols, on_msg, duration_sec).await
}

/// 24h rolling tickers. Without symbols, covers every listed symbol and
/// picks up new listings hourly.
pub async fn crawl_ticker(
    exchange: &str,
    market_type: MarketType,
    symbols: &[String],
    on_msg: OnMessage,
    duration_sec: u64,
) -> Result<SessionStats, CrawlError> {
    crawl_category(MessageType::Ticker, exchange, market_type, symbols, on_msg, duration_sec).await
}

/// Perpetual swap funding rates.
pub async fn crawl_funding_rate(
    exchange: &str,
    market_type: MarketType,
    symbols: &[String],
    on_msg: OnMessage,
    duration_sec: u64,
) -> Result<SessionStats, CrawlError> {
    crawl_category(MessageType::FundingRate, exchange, market_type, symbols, on_msg, duration_sec).await
}

/// Subscriptions for `crawl_candlestick`. An empty list expands to every
/// interval in `supported` between 10 seconds and 3 minutes, for all symbols.
pub fn candlestick_subscriptions(
    symbol_intervals: &[(String, u32)],
    supported: &[u32],
) -> Result<Vec<Subscription>, CrawlError> {
    if !symbol_intervals.is_empty() {
        return Ok(symbol_intervals.iter().map(|(s, i)| Subscription::candlestick(s.clone(), *i)).collect());
    }
    let defaults: Vec<Subscription> = supported
        .iter()
        .filter(|i| DEFAULT_CANDLESTICK_RANGE.contains(*i))
        .map(|i| Subscription::all(MessageType::Candlestick).with_interval(*i))
        .collect();
    if defaults.is_empty() {
        return Err(CrawlError::configuration("no candlestick interval between 10s and 180s is available"));
    }
    Ok(defaults)
}

/// Candlesticks (OHLCV) for `(symbol, interval seconds)` pairs.
pub async fn crawl_candlestick(
    exchange: &str,
    market_type: MarketType,
    symbol_intervals: &[(String, u32)],
    on_msg: OnMessage,
    duration_sec: u64,
) -> Result<SessionStats, CrawlError> {
    let subscriptions = if symbol_intervals.is_empty() {
        let adapter = AdapterRegistry::global().resolve(exchange, market_type)?;
        candlestick_subscriptions(symbol_intervals, adapter.candlestick_intervals(market_type))?
    } else {
        candlestick_subscriptions(symbol_intervals, &[])?
    };
    run(request(exchange, market_type, subscriptions, duration_sec), on_msg).await
}

/// Open interest of every listed contract.
pub async fn crawl_open_interest(
    exchange: &str,
    market_type: MarketType,
    on_msg: OnMessage,
    duration_sec: u64,
) -> Result<SessionStats, CrawlError> {
    crawl_category(MessageType::OpenInterest, exchange, market_type, &[], on_msg, duration_sec).await
}

/// Several message types of one symbol on one session.
pub async fn subscribe_symbol(
    exchange: &str,
    market_type: MarketType,
    symbol: &str,
    msg_types: &[MessageType],
    on_msg: OnMessage,
    duration_sec: u64,
) -> Result<SessionStats, CrawlError> {
    let subscriptions = msg_types.iter().map(|t| Subscription::new(symbol, *t)).collect();
    run(request(exchange, market_type, subscriptions, duration_sec), on_msg).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_symbols_mean_all() {
        assert_eq!(symbol_subscriptions(MessageType::Ticker, &[]), vec![Subscription::all(MessageType::Ticker)]);
        let subs = symbol_subscriptions(MessageType::Bbo, &["A".into(), "B".into()]);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[1].symbol.as_deref(), Some("B"));
    }

    #[test]
    fn candlestick_defaults_cover_10s_to_3m() {
        let subs = candlestick_subscriptions(&[], &[1, 15, 60, 180, 300, 3600]).unwrap();
        let intervals: Vec<u32> = subs.iter().filter_map(|s| s.interval).collect();
        assert_eq!(intervals, vec![15, 60, 180]);
        assert!(subs.iter().all(Subscription::is_wildcard));

        let err = candlestick_subscriptions(&[], &[300, 3600]).unwrap_err();
        assert!(matches!(err, CrawlError::Configuration(_)));
    }

    #[test]
    fn explicit_candlestick_pairs() {
        let subs = candlestick_subscriptions(&[("BTCUSDT".into(), 60), ("ETHUSDT".into(), 300)], &[]).unwrap();
        assert_eq!(subs[0], Subscription::candlestick("BTCUSDT", 60));
        assert_eq!(subs[1], Subscription::candlestick("ETHUSDT", 300));
    }

    #[tokio::test]
    async fn unknown_exchange_fails_fast() {
        let err = crawl_trade("nowhere", MarketType::Spot, &[], Box::new(|_| {}), 1).await.unwrap_err();
        assert!(matches!(err, CrawlError::NotSupported(_)));

        let err = crawl_candlestick("nowhere", MarketType::Spot, &[], Box::new(|_| {}), 1).await.unwrap_err();
        assert!(matches!(err, CrawlError::NotSupported(_)));
    }

    #[tokio::test]
    async fn candlestick_type_needs_interval() {
        let err = subscribe_symbol("binance", MarketType::Spot, "BTCUSDT", &[MessageType::Candlestick], Box::new(|_| {}), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Configuration(_)));
    }
}
