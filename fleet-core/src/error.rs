//! Error taxonomy (§7): one `thiserror` enum per component boundary.

use crate::ids::AgentId;
use thiserror::Error;

/// Errors from content-generation providers (§4.4). Transient errors are
/// retried by the runtime loop with backoff; permanent errors are not.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider {provider} request timed out")]
    Timeout { provider: String },
    #[error("provider {provider} rate limited")]
    RateLimited { provider: String },
    #[error("provider {provider} returned an empty completion")]
    EmptyCompletion { provider: String },
    #[error("provider {provider} request failed: {detail}")]
    RequestFailed { provider: String, detail: String },
    #[error("provider {provider} rejected invalid input: {detail}")]
    InvalidInput { provider: String, detail: String },
}

impl ProviderError {
    /// Transient errors are worth retrying with backoff; others are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Timeout { .. } | ProviderError::RateLimited { .. })
    }
}

/// Errors raised by an outbound gate denying an action (§4.5). These are not
/// failures of the runtime; they are expected, loggable denials.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("rate gate: {posts_in_window} posts already made in the last {window_hours}h window")]
    RateLimited {
        posts_in_window: u32,
        window_hours: f64,
    },
    #[error("cadence gate: only {elapsed_hours:.2}h elapsed, minimum is {min_hours:.2}h")]
    TooSoon {
        elapsed_hours: f64,
        min_hours: f64,
    },
    #[error("trading disabled for this agent")]
    TradingDisabled,
    #[error("trading safety: {reason}")]
    TradingUnsafe { reason: String },
    #[error("duplicate action: idempotency key {0:?} already processed")]
    Duplicate(String),
}

/// Errors from mention ingestion (§4.6).
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("mention source {source} unavailable: {detail}")]
    SourceUnavailable { source: String, detail: String },
    #[error("mention source {source} access denied: {detail}")]
    AccessDenied { source: String, detail: String },
    #[error("malformed mention payload: {0}")]
    Malformed(String),
}

/// Errors from the memory/relationship store (§4.3, §4.7).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("memory item {0} not found")]
    NotFound(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Internal-invariant and fatal errors from the runtime loop itself (§7).
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("agent {0} not found")]
    AgentNotFound(AgentId),
    #[error("agent {0} is not active")]
    AgentInactive(AgentId),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("internal invariant violated: {0}")]
    InvariantViolated(String),
}
