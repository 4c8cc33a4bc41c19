//! Error handling module
//!
//! This module provides centralized error handling for the payment core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Details about a pending payment that blocks a new creation attempt.
///
/// Carried inside [`AppError::Conflict`] so callers can offer the user the
/// choice between completing the existing link and canceling it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConflict {
    pub link_id: String,
    pub link_url: String,
    pub amount: f64,
    pub plan_name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Minutes until the pending link falls out of the conflict window.
    pub minutes_remaining: i64,
}

/// Application error types
#[derive(Error, Debug, Clone)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        pending: Option<PendingConflict>,
    },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Build a conflict error for an active pending payment on the same bundle.
    pub fn pending_conflict(pending: PendingConflict) -> Self {
        AppError::Conflict {
            message: "an active pending payment already exists for this bundle".to_string(),
            pending: Some(pending),
        }
    }

    /// Get HTTP status code for this error
    pub fn http_status_code(&self) -> warp::http::StatusCode {
        match self {
            AppError::Validation(_) => warp::http::StatusCode::BAD_REQUEST,
            AppError::Conflict { .. } => warp::http::StatusCode::CONFLICT,
            AppError::Authentication(_) => warp::http::StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => warp::http::StatusCode::NOT_FOUND,
            AppError::Gateway(_) => warp::http::StatusCode::BAD_GATEWAY,
            AppError::Config(_) | AppError::Storage(_) | AppError::Internal(_) => {
                warp::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Application result type
pub type AppResult<T> = Result<T, AppError>;

// Implement warp::reject::Reject for AppError
impl warp::reject::Reject for AppError {}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("malformed payload: {}", err))
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Storage(err.to_string())
    }
}
