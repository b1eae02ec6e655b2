//! Control API error taxonomy (§6): one structured JSON body per failure,
//! carrying the authoritative error code set callers match on. Mirrors the
//! teacher's `ErrorResponse` shape (an `id` plus a message), widened to a
//! `code` field since this surface is REST rather than one multiplexed
//! WebSocket channel.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("agent {0:?} not found")]
    AgentNotFound(String),
    #[error("agent {0:?} is not active")]
    AgentInactive(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("trading is disabled for this agent")]
    TradingDisabled,
    #[error("insufficient wallet balance")]
    InsufficientBalance,
    #[error("rate limited, retry after {retry_after_hours:.2}h")]
    ApiRateLimit { retry_after_hours: f64 },
    #[error("memory item {0:?} not found")]
    MemoryNotFound(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("too soon since last post")]
    TooSoonSincLastPost { last_post_time: Option<SystemTime> },
    #[error("internal error: {0}")]
    SystemError(String),
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_post_time: Option<SystemTime>,
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::AgentNotFound(_) => "AGENT_NOT_FOUND",
            ApiError::AgentInactive(_) => "AGENT_INACTIVE",
            ApiError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            ApiError::TradingDisabled => "TRADING_DISABLED",
            ApiError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ApiError::ApiRateLimit { .. } => "API_RATE_LIMIT",
            ApiError::MemoryNotFound(_) => "MEMORY_NOT_FOUND",
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::TooSoonSincLastPost { .. } => "TOO_SOON_SINCE_LAST_POST",
            ApiError::SystemError(_) => "SYSTEM_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::AgentNotFound(_) | ApiError::MemoryNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AgentInactive(_)
            | ApiError::InvalidConfiguration(_)
            | ApiError::TradingDisabled
            | ApiError::InsufficientBalance
            | ApiError::InvalidRequest(_)
            | ApiError::TooSoonSincLastPost { .. } => StatusCode::BAD_REQUEST,
            ApiError::ApiRateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::SystemError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let last_post_time = match &self {
            ApiError::TooSoonSincLastPost { last_post_time } => *last_post_time,
            _ => None,
        };
        let status = self.status();
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
            last_post_time,
        };
        (status, Json(body)).into_response()
    }
}

impl From<fleet_core::RuntimeError> for ApiError {
    fn from(err: fleet_core::RuntimeError) -> Self {
        use fleet_core::RuntimeError::*;
        match err {
            AgentNotFound(id) => ApiError::AgentNotFound(id.to_string()),
            AgentInactive(id) => ApiError::AgentInactive(id.to_string()),
            InvalidConfiguration(detail) => ApiError::InvalidConfiguration(detail),
            Gate(gate_err) => gate_err.into(),
            other => ApiError::SystemError(other.to_string()),
        }
    }
}

impl From<fleet_core::GateError> for ApiError {
    fn from(err: fleet_core::GateError) -> Self {
        use fleet_core::GateError::*;
        match err {
            RateLimited { window_hours, .. } => ApiError::ApiRateLimit {
                retry_after_hours: window_hours,
            },
            TooSoon { .. } => ApiError::TooSoonSincLastPost { last_post_time: None },
            TradingDisabled => ApiError::TradingDisabled,
            TradingUnsafe { reason } => ApiError::InvalidRequest(reason),
            Duplicate(key) => ApiError::InvalidRequest(format!("duplicate action: {key}")),
        }
    }
}

impl From<fleet_core::StoreError> for ApiError {
    fn from(err: fleet_core::StoreError) -> Self {
        match err {
            fleet_core::StoreError::NotFound(id) => ApiError::MemoryNotFound(id),
            other => ApiError::SystemError(other.to_string()),
        }
    }
}
