//! Typed error categories shared by every component in the ingestion core.
//!
//! Each variant group mirrors one of the categories in the error-handling
//! design: `http`, `parse`, `killmail`, `cache`, `validation`, `upstream`.
//! Consumers (the HTTP layer, the poller) match on these to decide whether
//! to retry, skip, or surface a status code.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HttpError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("upstream returned status {0}")]
    HttpStatus(u16),
}

impl HttpError {
    pub fn is_retryable(&self) -> bool {
        match self {
            HttpError::Timeout | HttpError::ConnectionFailed(_) | HttpError::RateLimited => true,
            HttpError::HttpStatus(code) => {
                *code == 429 || *code == 408 || (500..600).contains(code)
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("invalid killmail format: {0}")]
    InvalidFormat(String),
    #[error("missing required fields: {0}")]
    MissingRequiredFields(String),
    #[error("invalid time value: {0}")]
    InvalidTime(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KillmailError {
    #[error("missing solar_system_id")]
    MissingSystemId,
    #[error("missing zkb hash")]
    MissingHash,
    #[error("missing kill_time")]
    MissingKillTime,
    #[error("failed to build killmail: {0}")]
    BuildFailed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error("not found")]
    NotFound,
    #[error("cache backend error: {0}")]
    BackendError(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid id: {0}")]
    InvalidId(String),
    #[error("value out of range: {0}")]
    OutOfRange(String),
    #[error("too many entries: {0}")]
    TooManyEntries(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("ESI error: {0}")]
    Esi(String),
    #[error("zKillboard error: {0}")]
    Zkb(String),
}

/// Umbrella error for anything that crosses a component boundary in the
/// ingestion core. The HTTP layer converts this into a status code; internal
/// callers match on the category directly.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Killmail(#[from] KillmailError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl CoreError {
    pub fn category(&self) -> &'static str {
        match self {
            CoreError::Http(_) => "http",
            CoreError::Parse(_) => "parse",
            CoreError::Killmail(_) => "killmail",
            CoreError::Cache(_) => "cache",
            CoreError::Validation(_) => "validation",
            CoreError::Upstream(_) => "upstream",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Http(e) if e.is_retryable())
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
