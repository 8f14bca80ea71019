//! # crawl-runner
//!
//! Runs the crawl jobs of a JSON configuration file and prints every message
//! to stdout as one JSON line.
//!
//! # Usage
//!
//! ```bash
//! crawl-runner jobs.json --log-level info --log-dir /tmp/log
//! ```
//!
//! Jobs with `duration_sec` stop on their own; Ctrl+C stops the rest.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use crawl_core::Message;
use crawl_core::config::JobConfig;
use crawl_md::{AdapterRegistry, CrawlRequest, CrawlSession, OnMessage};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Realtime crypto market-data crawler.
#[derive(Parser)]
#[command(name = "crawl-runner", about = "Realtime crypto market-data crawler")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output. Overrides `logging.log_path`.
    #[arg(long)]
    log_dir: Option<String>,
}

fn print_message(msg: Message) {
    match serde_json::to_string(&msg) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!("unprintable message from {}: {e}", msg.exchange),
    }
}

fn request(job: &JobConfig) -> CrawlRequest {
    CrawlRequest::new(job.exchange.clone(), job.market_type, job.subscriptions()).with_duration(job.duration())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration (logging metadata lives in it)
    let config = crawl_core::config::load_config(&cli.config)?;
    let logging = config.logging.clone().unwrap_or_default();
    let log_dir = cli.log_dir.clone().or(logging.log_path);
    let module_name = logging.module_name.unwrap_or_else(|| "crawl-runner".to_string());

    // 2. Initialize logging
    crawl_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &module_name)?;
    info!("crawl-runner starting, config={}, {} job(s)", cli.config.display(), config.jobs.len());

    // 3. Start one session per job
    let registry = AdapterRegistry::global();
    let shutdown = CancellationToken::new();
    let mut sessions = JoinSet::new();

    for (idx, job) in config.jobs.iter().enumerate() {
        let on_msg: OnMessage = Box::new(print_message);
        let mut session = CrawlSession::with_registry(registry.clone(), config.crawler.clone(), request(job), on_msg);
        if let Err(e) = session.start() {
            error!("job[{idx}] {}: {e}", job.label());
            continue;
        }
        info!("job[{idx}] {} started", job.label());

        let label = job.label();
        let shutdown = shutdown.clone();
        sessions.spawn(async move {
            let token = session.cancel_handle();
            tokio::select! {
                _ = shutdown.cancelled() => token.cancel(),
                _ = token.cancelled() => {}
            }
            let stats = session.wait().await;
            info!("job {label} finished: {stats}");
        });
    }

    if sessions.is_empty() {
        anyhow::bail!("no job could be started");
    }

    // 4. Run until every job ends or Ctrl+C
    tokio::select! {
        _ = async { while sessions.join_next().await.is_some() {} } => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutdown signal received");
            shutdown.cancel();
        }
    }
    while sessions.join_next().await.is_some() {}

    info!("all jobs stopped");
    Ok(())
}
