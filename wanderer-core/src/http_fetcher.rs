//! Outbound HTTP with rate-limit integration, status classification, and
//! exponential-backoff retry for retryable failures (§4.5).

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::error::HttpError;
use crate::rate_limiter::{RateLimiter, Upstream};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub factor: u32,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_secs(1),
            factor: 2,
            max: Duration::from_secs(30),
        }
    }
}

/// Thin wrapper around a `reqwest::Client` that applies the rate limiter
/// before every send and retries retryable failures with backoff.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        let client = Client::builder()
            .user_agent(user_agent.clone())
            .gzip(true)
            .build()
            .expect("reqwest client builder is infallible for this config");
        Self { client, user_agent }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn classify_status(status: StatusCode) -> Result<(), HttpError> {
        if status.is_success() {
            return Ok(());
        }
        let code = status.as_u16();
        if status == StatusCode::NOT_FOUND {
            return Err(HttpError::HttpStatus(code));
        }
        Err(HttpError::HttpStatus(code))
    }

    /// Fetch `url`, acquiring a token from `limiter` for `upstream` before
    /// every attempt, retrying retryable classifications per `policy`.
    pub async fn get(
        &self,
        url: &str,
        limiter: &RateLimiter,
        upstream: Upstream,
        policy: RetryPolicy,
    ) -> Result<String, HttpError> {
        let mut attempt = 0u32;
        let mut delay = policy.base;
        loop {
            limiter.acquire(upstream).await;
            let outcome = self.send_once(url).await;
            match outcome {
                Ok(body) => return Ok(body),
                Err(err) => {
                    let retryable = err.is_retryable();
                    attempt += 1;
                    if !retryable || attempt > policy.max_retries {
                        warn!(%url, attempt, error = %err, "giving up on request");
                        return Err(err);
                    }
                    debug!(%url, attempt, delay_ms = delay.as_millis() as u64, "retrying request");
                    tokio::time::sleep(delay).await;
                    delay = (delay * policy.factor).min(policy.max);
                }
            }
        }
    }

    async fn send_once(&self, url: &str) -> Result<String, HttpError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout
            } else if e.is_connect() {
                HttpError::ConnectionFailed(e.to_string())
            } else {
                HttpError::ConnectionFailed(e.to_string())
            }
        })?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(HttpError::RateLimited);
        }
        Self::classify_status(status)?;
        response
            .text()
            .await
            .map_err(|e| HttpError::ConnectionFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_not_found_as_http_status() {
        let err = HttpFetcher::classify_status(StatusCode::NOT_FOUND).unwrap_err();
        assert_eq!(err, HttpError::HttpStatus(404));
        assert!(!err.is_retryable());
    }

    #[test]
    fn classifies_server_error_as_retryable() {
        let err = HttpFetcher::classify_status(StatusCode::INTERNAL_SERVER_ERROR).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn classifies_other_4xx_as_fatal() {
        let err = HttpFetcher::classify_status(StatusCode::FORBIDDEN).unwrap_err();
        assert!(!err.is_retryable());
    }
}
