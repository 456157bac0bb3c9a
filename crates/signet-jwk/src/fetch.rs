//! Key-set fetch pipeline
//!
//! One HTTP GET per attempt, with retries paced by the caller-supplied
//! backoff policy. Refresh scheduling is not handled here; this module only
//! reports what the response headers say about freshness.

use std::time::Duration;

use reqwest::header::{CACHE_CONTROL, EXPIRES, HeaderMap};
use tracing::{debug, warn};

use crate::backoff::BackoffPolicy;
use crate::error::{RegistryError, Result};

/// A fetched key-set document plus the response headers that describe it
#[derive(Debug)]
pub struct FetchOutcome {
    /// Raw response body
    pub body: Vec<u8>,
    /// Response headers, consulted for refresh scheduling
    pub headers: HeaderMap,
}

/// GET `url`, retrying per `backoff`
///
/// Any 2xx status is accepted. Transport errors and non-2xx responses fail
/// the attempt; once the policy is exhausted the last error surfaces.
pub async fn fetch_key_set_document(
    client: &reqwest::Client,
    url: &str,
    backoff: &BackoffPolicy,
) -> Result<FetchOutcome> {
    let mut attempt: u32 = 0;
    loop {
        match fetch_once(client, url).await {
            Ok(outcome) => return Ok(outcome),
            Err(err) => {
                attempt += 1;
                match backoff.delay_before(attempt) {
                    Some(delay) => {
                        warn!(
                            url,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "key set fetch failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(err),
                }
            }
        }
    }
}

async fn fetch_once(client: &reqwest::Client, url: &str) -> Result<FetchOutcome> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| RegistryError::FetchFailed {
            reason: format!("GET {url}: {err}"),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(RegistryError::FetchFailed {
            reason: format!("{url} returned status {status}"),
        });
    }

    let headers = response.headers().clone();
    let body = response
        .bytes()
        .await
        .map_err(|err| RegistryError::FetchFailed {
            reason: format!("reading body from {url}: {err}"),
        })?
        .to_vec();

    debug!(url, bytes = body.len(), "fetched key set document");
    Ok(FetchOutcome { body, headers })
}

/// Time until the next scheduled refresh for a just-fetched target
///
/// An explicitly configured interval always wins. Otherwise the
/// `Cache-Control: max-age` directive is consulted, then a parseable
/// `Expires` date; both are floored at `min_interval`, which is also the
/// fallback when the response says nothing about freshness.
pub fn next_refresh_interval(
    headers: &HeaderMap,
    explicit_interval: Option<Duration>,
    min_interval: Duration,
) -> Duration {
    if let Some(interval) = explicit_interval {
        return interval;
    }

    if let Some(value) = headers.get(CACHE_CONTROL) {
        if let Ok(text) = value.to_str() {
            for directive in text.split(',') {
                let directive = directive.trim();
                if let Some(seconds) = directive.strip_prefix("max-age=") {
                    if let Ok(seconds) = seconds.parse::<u64>() {
                        return Duration::from_secs(seconds).max(min_interval);
                    }
                }
            }
        }
    }

    if let Some(value) = headers.get(EXPIRES) {
        if let Ok(text) = value.to_str() {
            if let Ok(expires) = chrono::DateTime::parse_from_rfc2822(text) {
                let until = expires
                    .signed_duration_since(chrono::Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                return until.max(min_interval);
            }
        }
    }

    min_interval
}
