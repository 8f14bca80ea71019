//! Shared HTTP client for REST polling (order book snapshots, open interest,
//! symbol listings).

use std::sync::LazyLock;
use std::time::Duration;

use crate::error::ConnectionError;

static CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("crawl-md/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
});

/// GET `url` and return the response body.
///
/// Non-2xx statuses are errors. `timeout` bounds the whole request including
/// the body download.
pub async fn get_bytes(url: &str, timeout: Duration) -> Result<Vec<u8>, ConnectionError> {
    let response = CLIENT.get(url).timeout(timeout).send().await.map_err(map_reqwest)?;
    let response = response.error_for_status().map_err(map_reqwest)?;
    let body = response.bytes().await.map_err(map_reqwest)?;
    Ok(body.to_vec())
}

fn map_reqwest(e: reqwest::Error) -> ConnectionError {
    if e.is_timeout() { ConnectionError::Timeout } else { ConnectionError::Http(e.to_string()) }
}
