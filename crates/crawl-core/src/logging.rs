//! Process-wide `tracing` subscriber for the crawler binaries.
//!
//! Stdout is reserved for crawled messages, so human-readable log lines go to
//! stderr. With a log directory, the same events are also appended to a file
//! rotated daily, named after the module.

use anyhow::Context;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// `RUST_LOG` when set and valid, else `fallback`, else `info`.
fn level_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Fails if one is already installed;
/// library code leaves this to the embedding application.
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str) -> anyhow::Result<()> {
    let stderr = fmt::layer().with_writer(std::io::stderr).with_thread_names(true);

    let file = log_dir.map(|dir| {
        fmt::layer()
            .with_writer(rolling::daily(dir, module_name))
            .with_ansi(false)
            .with_thread_names(true)
    });

    tracing_subscriber::registry()
        .with(level_filter(log_level))
        .with(stderr)
        .with(file)
        .try_init()
        .context("tracing subscriber already installed")
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::LevelFilter;

    use super::*;

    #[test]
    fn bad_level_falls_back_to_info() {
        // Only meaningful when RUST_LOG is unset, as in CI.
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(level_filter("crawl=loud").max_level_hint(), Some(LevelFilter::INFO));
            assert_eq!(level_filter("debug").max_level_hint(), Some(LevelFilter::DEBUG));
        }
    }

    #[test]
    fn second_init_is_an_error() {
        let _ = init_logging("warn", None, "test");
        assert!(init_logging("warn", None, "test").is_err());
    }
}
