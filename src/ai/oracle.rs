//! Oracle capability: the single seam between the AI layer and whatever
//! language-model service the caller wires in.
//!
//! The core never sees HTTP, providers or credentials. It hands over a
//! system prompt and a user prompt and gets text back; everything else is
//! the implementation's business.

use async_trait::async_trait;

/// Errors an oracle implementation can surface. The decision maker never
/// propagates these; every variant triggers the rule-based fallback.
#[derive(Debug, Clone)]
pub enum OracleError {
    Timeout,
    RateLimited,
    Provider(String),
    InvalidResponse(String),
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleError::Timeout => write!(f, "oracle request timed out"),
            OracleError::RateLimited => write!(f, "oracle rate limited"),
            OracleError::Provider(e) => write!(f, "oracle provider error: {}", e),
            OracleError::InvalidResponse(e) => write!(f, "unusable oracle response: {}", e),
        }
    }
}

impl std::error::Error for OracleError {}

/// A language-model oracle. Implementations are expected to apply their
/// own timeout; the call blocks the cycle until it returns.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Send one prompt pair and return the raw response body. The body
    /// is expected to contain a JSON object, but parsing is forgiving.
    async fn call(&self, system_prompt: &str, user_prompt: &str) -> Result<String, OracleError>;
}
