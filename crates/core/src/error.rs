//! Error types for the taskweave domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all taskweave operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Gateway errors ---
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    // --- Document store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures from the language-model gateway.
///
/// Transient variants (`ServiceOverloaded`, `RateLimited`) are retried by the
/// gateway; everything else terminates the attempt immediately.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Model service overloaded: {0}")]
    ServiceOverloaded(String),

    #[error("Rate limited by model endpoint, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Circuit breaker open, call rejected")]
    CircuitOpen,

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl GatewayError {
    /// Whether this failure is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::ServiceOverloaded(_) | GatewayError::RateLimited { .. }
        )
    }

    /// Stable machine-readable label for the `error` field of a dispatch result.
    pub fn label(&self) -> &'static str {
        match self {
            GatewayError::ServiceOverloaded(_) => "service_overloaded",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::AuthFailed(_) => "auth_error",
            GatewayError::MalformedResponse(_) => "malformed_response",
            GatewayError::CircuitOpen => "circuit_open",
            GatewayError::Timeout(_) => "service_overloaded",
            GatewayError::Network(_) => "service_overloaded",
        }
    }
}

/// Failures from the document store or key-value cache collaborators.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}
