//! Error types for generative and embedding collaborators.
//!
//! Services with unpredictable output (intent classification, enrichment,
//! note merging, embedding backends) report failures as values so the
//! ranking engine can degrade per its documented fallback instead of
//! unwinding. Transport failures are retryable; schema failures are not.

use thiserror::Error;

/// Failure of an external service call.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Network failure, timeout, or a retryable server-side error.
    #[error("transient service failure: {0}")]
    Transient(String),

    /// The service answered, but the payload did not match the expected
    /// schema. Retrying with the same input is unlikely to help.
    #[error("malformed service response: {0}")]
    Schema(String),
}

impl ServiceError {
    /// Whether the caller's retry policy applies to this failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_flag() {
        assert!(ServiceError::Transient("timeout".into()).is_transient());
        assert!(!ServiceError::Schema("missing field".into()).is_transient());
    }
}
