//! The crate-wide `AppError`/`AppResult` every fallible handler returns
//! (§4.14): an HTTP status plus a typed category, with `From` conversions
//! from every `wanderer_core::error` category.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use wanderer_core::error::{CacheError, CoreError, HttpError, KillmailError, ParseError, UpstreamError, ValidationError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Http,
    Parse,
    Killmail,
    Cache,
    Validation,
    Upstream,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Http => "http",
            ErrorCategory::Parse => "parse",
            ErrorCategory::Killmail => "killmail",
            ErrorCategory::Cache => "cache",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Upstream => "upstream",
            ErrorCategory::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub category: ErrorCategory,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            status,
            category,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorCategory::Internal, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCategory::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorCategory::Cache, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, ErrorCategory::Internal, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
                "category": self.category.to_string(),
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::Validation(_) => Self::new(StatusCode::BAD_REQUEST, ErrorCategory::Validation, err.to_string()),
            CoreError::Cache(CacheError::NotFound) => Self::new(StatusCode::NOT_FOUND, ErrorCategory::Cache, err.to_string()),
            CoreError::Cache(CacheError::BackendError(_)) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorCategory::Cache, err.to_string())
            }
            CoreError::Parse(_) => Self::new(StatusCode::BAD_REQUEST, ErrorCategory::Parse, err.to_string()),
            CoreError::Killmail(_) => Self::new(StatusCode::BAD_REQUEST, ErrorCategory::Killmail, err.to_string()),
            CoreError::Http(_) => Self::new(StatusCode::BAD_GATEWAY, ErrorCategory::Http, err.to_string()),
            CoreError::Upstream(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorCategory::Upstream, err.to_string()),
        }
    }
}

impl From<ParseError> for AppError {
    fn from(err: ParseError) -> Self {
        CoreError::from(err).into()
    }
}

impl From<KillmailError> for AppError {
    fn from(err: KillmailError) -> Self {
        CoreError::from(err).into()
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        CoreError::from(err).into()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        CoreError::from(err).into()
    }
}

impl From<UpstreamError> for AppError {
    fn from(err: UpstreamError) -> Self {
        CoreError::from(err).into()
    }
}

impl From<HttpError> for AppError {
    fn from(err: HttpError) -> Self {
        CoreError::from(err).into()
    }
}
