//! Retry policy shared by the authenticated and pre-authenticated transports
//!
//! A [`RetryPolicy`] is a plain value built from [`RetryConfig`] and owned by
//! the [`GraphClient`](crate::client::GraphClient). The loop in
//! [`send_with_retry`] asks a caller-supplied closure for a fresh
//! `RequestBuilder` on every attempt, which is what lets the two transports
//! differ only in how a request is built.
//!
//! ## Backoff
//!
//! `delay(n) = min(base * factor^n, cap)` with uniform jitter in `[0.75, 1.25]`.
//! For HTTP 429 only, a numeric `Retry-After` greater than zero replaces the
//! computed delay verbatim and is not capped.

use std::future::Future;
use std::time::Duration;

use onesync_core::config::RetryConfig;
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{is_retryable, request_id, ApiError, GraphError, Result};

const JITTER_LOW: f64 = 0.75;
const JITTER_HIGH: f64 = 1.25;

/// Exponential backoff parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry
    pub base: Duration,
    /// Multiplier applied per attempt
    pub factor: u32,
    /// Ceiling for the computed delay (not applied to `Retry-After`)
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: config.base_delay(),
            factor: config.factor,
            cap: config.max_delay(),
        }
    }
}

impl RetryPolicy {
    /// Backoff for `attempt` (0-based) before jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        self.factor
            .checked_pow(attempt)
            .and_then(|multiplier| self.base.checked_mul(multiplier))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    /// Backoff for `attempt` (0-based) with jitter applied
    pub fn backoff(&self, attempt: u32) -> Duration {
        apply_jitter(self.base_delay(attempt))
    }

    /// Delay before retrying after a retryable HTTP status.
    ///
    /// `Retry-After` is honoured for 429 only; every other status uses the
    /// computed backoff.
    pub fn delay_for_status(&self, status: StatusCode, headers: &HeaderMap, attempt: u32) -> Duration {
        if status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(delay) = headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after)
            {
                return delay;
            }
        }
        self.backoff(attempt)
    }
}

/// Multiplies `delay` by a uniform factor in `[0.75, 1.25]`, saturating at
/// `Duration::MAX`
pub fn apply_jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(JITTER_LOW..=JITTER_HIGH);
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Parses a `Retry-After` header value given as whole seconds.
///
/// Returns `None` for zero, negative, fractional or HTTP-date values so the
/// caller falls back to its computed backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    match value.trim().parse::<u64>() {
        Ok(seconds) if seconds > 0 => Some(Duration::from_secs(seconds)),
        _ => {
            debug!(value, "Ignoring unusable Retry-After header");
            None
        }
    }
}

/// Sleeps for `delay` unless `cancel` fires first
pub(crate) async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GraphError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Drains a failed response and turns it into an [`ApiError`]
pub(crate) async fn api_error(response: Response) -> ApiError {
    let status = response.status();
    let request_id = request_id(response.headers());
    let body = response.text().await.unwrap_or_default();
    ApiError::new(status, request_id, body)
}

/// Runs the shared retry loop.
///
/// `build` is invoked once per attempt and must produce a complete,
/// independent request. `endpoint` is a log label only; it must not contain
/// pre-authenticated URLs.
pub(crate) async fn send_with_retry<F, Fut>(
    policy: &RetryPolicy,
    endpoint: &str,
    cancel: &CancellationToken,
    mut build: F,
) -> Result<Response>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RequestBuilder>>,
{
    let max_retries = policy.max_retries;
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }

        let request = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GraphError::Cancelled),
            built = build() => built?,
        };

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GraphError::Cancelled),
            sent = request.send() => sent,
        };

        match sent {
            Ok(response) if response.status().is_success() => {
                if attempt > 0 {
                    info!(endpoint, attempt, "Request succeeded after retry");
                }
                return Ok(response);
            }
            Ok(response) => {
                let status = response.status();
                let headers = response.headers().clone();
                let error = api_error(response).await;

                if !is_retryable(status) || attempt >= max_retries {
                    warn!(
                        endpoint,
                        status = status.as_u16(),
                        request_id = error.request_id.as_deref().unwrap_or("-"),
                        attempts = attempt + 1,
                        "Request failed"
                    );
                    return Err(GraphError::Api(error));
                }

                let delay = policy.delay_for_status(status, &headers, attempt);
                warn!(
                    endpoint,
                    status = status.as_u16(),
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    "Retryable status, backing off"
                );
                sleep_or_cancel(delay, cancel).await?;
            }
            Err(err) => {
                if cancel.is_cancelled() {
                    return Err(GraphError::Cancelled);
                }
                if attempt >= max_retries {
                    warn!(
                        endpoint,
                        attempts = attempt + 1,
                        error = %err,
                        "Network error, retry limit exhausted"
                    );
                    return Err(GraphError::Network {
                        attempts: attempt + 1,
                        source: err,
                    });
                }

                let delay = policy.backoff(attempt);
                warn!(
                    endpoint,
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Network error, backing off"
                );
                sleep_or_cancel(delay, cancel).await?;
            }
        }

        attempt += 1;
    }
}
