//! Error types for the windowpack domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator has its own error type; only configuration errors and
//! malformed inputs ever escape an assembly pass. Collaborator failures are
//! recovered where they happen, and budget exhaustion is reported as data.

use thiserror::Error;

/// The top-level error type for all windowpack operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Malformed caller input ---
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Knowledge errors ---
    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    // --- Tokenizer errors ---
    #[error("Tokenizer error: {0}")]
    Tokenize(#[from] TokenizeError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Collaborator errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum KnowledgeError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum TokenizeError {
    #[error("Tokenizer unavailable: {0}")]
    Unavailable(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn config_shorthand() {
        let err = Error::config("history.min_fraction must be <= history.max_fraction");
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("history.min_fraction"));
    }

    #[test]
    fn knowledge_error_converts() {
        let err: Error = KnowledgeError::QueryFailed("index offline".into()).into();
        assert!(err.to_string().contains("index offline"));
    }
}
