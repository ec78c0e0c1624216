//! Typed REST provider errors.
//!
//! Embedded in `anyhow::Error` so `ChatModel` keeps an `anyhow::Result`
//! signature while callers can still `downcast_ref::<ProviderError>()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("Rate limited (status {status}): {message}")]
    RateLimited { status: u16, message: String },

    #[error("Authentication failed (status {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Request failed (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Failed to parse response JSON: {0}")]
    Decode(String),

    #[error("Response contained no candidates")]
    EmptyResponse,

    #[error("API key is not a valid HTTP header value")]
    InvalidApiKey,
}

impl ProviderError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => ProviderError::RateLimited { status, message: body },
            401 | 403 => ProviderError::Auth { status, message: body },
            _ => ProviderError::Status { status, message: body },
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}
