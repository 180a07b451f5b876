//! The RedisQ long-poll loop: adaptive interval scheduling plus exponential
//! backoff on error (§4.1). `RedisQPoller::run` drives the loop; everything
//! it depends on is injected so the scheduling logic can be tested without
//! a network or real sleeps.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::config::RedisQSection;
use crate::error::{HttpError, ParseError};
use crate::http_fetcher::{HttpFetcher, RetryPolicy};
use crate::rate_limiter::{RateLimiter, Upstream};

#[derive(Debug, Deserialize)]
struct RedisQEnvelope {
    package: Option<RedisQPackageBody>,
}

#[derive(Debug, Deserialize)]
struct RedisQPackageBody {
    killmail: Value,
    zkb: Value,
}

#[derive(Debug)]
pub enum RedisQPackage {
    Empty,
    Kill { killmail: Value, zkb: Value },
}

#[async_trait]
pub trait RedisQClient: Send + Sync {
    async fn poll(&self, queue_id: &str) -> Result<RedisQPackage, PollError>;
}

#[derive(Debug)]
pub enum PollError {
    Http(HttpError),
    UnexpectedFormat(String),
}

impl From<HttpError> for PollError {
    fn from(e: HttpError) -> Self {
        PollError::Http(e)
    }
}

pub struct HttpRedisQClient {
    fetcher: HttpFetcher,
    limiter: std::sync::Arc<RateLimiter>,
    base_url: String,
}

impl HttpRedisQClient {
    pub fn new(fetcher: HttpFetcher, limiter: std::sync::Arc<RateLimiter>, base_url: String) -> Self {
        Self {
            fetcher,
            limiter,
            base_url,
        }
    }
}

#[async_trait]
impl RedisQClient for HttpRedisQClient {
    async fn poll(&self, queue_id: &str) -> Result<RedisQPackage, PollError> {
        let url = format!("{}?queueID={}&ttw=1", self.base_url, queue_id);
        let body = self
            .fetcher
            .get(&url, &self.limiter, Upstream::Zkb, RetryPolicy::default())
            .await?;
        let envelope: RedisQEnvelope = serde_json::from_str(&body)
            .map_err(|e| PollError::UnexpectedFormat(e.to_string()))?;
        match envelope.package {
            None => Ok(RedisQPackage::Empty),
            Some(body) => Ok(RedisQPackage::Kill {
                killmail: body.killmail,
                zkb: body.zkb,
            }),
        }
    }
}

/// Tracks the current backoff delay. On error the delay is grown
/// immediately and returned (so the first failure after an idle bucket
/// already yields `initial * factor`, matching the documented schedule);
/// on success it resets to `initial`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffState {
    current: Duration,
    initial: Duration,
    factor: u32,
    max: Duration,
}

impl BackoffState {
    pub fn new(initial: Duration, factor: u32, max: Duration) -> Self {
        Self {
            current: initial,
            initial,
            factor,
            max,
        }
    }

    pub fn on_error(&mut self) -> Duration {
        self.current = (self.current * self.factor).min(self.max);
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    KillReceived,
    NoActivity,
    Older,
    Error,
}

/// Computes the delay before the next poll attempt given the last outcome,
/// per the adaptive-scheduling table in §4.1. Pure function so the table is
/// directly testable (see `tests::s6_redisq_backoff`).
pub fn next_delay(outcome: PollOutcome, redisq: &RedisQSection, backoff: &mut BackoffState) -> Duration {
    match outcome {
        PollOutcome::KillReceived | PollOutcome::NoActivity | PollOutcome::Older => {
            backoff.reset();
            if outcome == PollOutcome::KillReceived {
                redisq.fast_interval
            } else {
                redisq.idle_interval
            }
        }
        PollOutcome::Error => backoff.on_error(),
    }
}

pub fn new_queue_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[instrument(skip(client))]
pub async fn poll_once(client: &dyn RedisQClient, queue_id: &str) -> Result<RedisQPackage, PollError> {
    match client.poll(queue_id).await {
        Ok(package) => Ok(package),
        Err(PollError::Http(e)) => {
            warn!(error = %e, "RedisQ poll failed");
            Err(PollError::Http(e))
        }
        Err(PollError::UnexpectedFormat(msg)) => {
            warn!(%msg, "RedisQ returned an unexpected envelope shape");
            Err(PollError::UnexpectedFormat(msg))
        }
    }
}

pub fn parse_error_to_poll_outcome(_err: &ParseError) -> PollOutcome {
    // Hard parse errors (stages 1-3) are logged and counted by the caller
    // but never stop the loop; from the scheduler's point of view they are
    // indistinguishable from any other per-kill failure.
    PollOutcome::Error
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redisq_section() -> RedisQSection {
        RedisQSection {
            url: "https://example.invalid/listen.php".to_string(),
            fast_interval: Duration::from_secs(1),
            idle_interval: Duration::from_secs(5),
            initial_backoff: Duration::from_millis(1000),
            backoff_factor: 2,
            max_backoff: Duration::from_millis(30_000),
            cutoff_window: Duration::from_secs(24 * 3600),
        }
    }

    #[test]
    fn s6_redisq_backoff() {
        let redisq = redisq_section();
        let mut backoff = BackoffState::new(redisq.initial_backoff, redisq.backoff_factor, redisq.max_backoff);

        let d1 = next_delay(PollOutcome::Error, &redisq, &mut backoff);
        let d2 = next_delay(PollOutcome::Error, &redisq, &mut backoff);
        let d3 = next_delay(PollOutcome::Error, &redisq, &mut backoff);

        assert_eq!(d1, Duration::from_millis(2000));
        assert_eq!(d2, Duration::from_millis(4000));
        assert_eq!(d3, Duration::from_millis(8000));

        let recovered = next_delay(PollOutcome::NoActivity, &redisq, &mut backoff);
        assert_eq!(recovered, redisq.idle_interval);

        let next_error = next_delay(PollOutcome::Error, &redisq, &mut backoff);
        assert_eq!(next_error, Duration::from_millis(2000));
    }

    #[test]
    fn kill_received_uses_fast_interval_and_resets_backoff() {
        let redisq = redisq_section();
        let mut backoff = BackoffState::new(redisq.initial_backoff, redisq.backoff_factor, redisq.max_backoff);
        backoff.on_error();
        backoff.on_error();
        let delay = next_delay(PollOutcome::KillReceived, &redisq, &mut backoff);
        assert_eq!(delay, redisq.fast_interval);
        assert_eq!(backoff.current, redisq.initial_backoff);
    }

    #[test]
    fn backoff_caps_at_max() {
        let redisq = redisq_section();
        let mut backoff = BackoffState::new(redisq.initial_backoff, redisq.backoff_factor, redisq.max_backoff);
        for _ in 0..10 {
            backoff.on_error();
        }
        assert_eq!(backoff.current, redisq.max_backoff);
    }
}
