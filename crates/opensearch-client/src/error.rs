//! OpenSearch client errors

use thiserror::Error;

/// Errors that can occur when interacting with the OpenSearch admin API
#[derive(Debug, Error)]
pub enum OpenSearchError {
    /// HTTP request/response error that could not be classified further
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Object or index does not exist (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network failure, timeout or 5xx; safe to retry
    #[error("Transient error: {0}")]
    Transient(String),

    /// Optimistic concurrency or version conflict (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request rejected as invalid (400/422)
    #[error("Invalid request: {0}")]
    Invalid(String),

    /// Credentials rejected (401/403)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Existing object belongs to another owner
    #[error("Ownership mismatch: {0}")]
    Ownership(String),

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// OpenSearch returned an unexpected status
    #[error("OpenSearch API error: {0}")]
    Api(String),
}

/// Coarse classification of an [`OpenSearchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 404
    NotFound,
    /// Network, timeout, 5xx
    Transient,
    /// 409
    Conflict,
    /// 400, 422
    Invalid,
    /// UID mismatch on an adopted object
    Ownership,
    /// Decode failures, auth failures and anything unexpected
    Fatal,
}

impl OpenSearchError {
    /// Classify the error.
    pub fn class(&self) -> ErrorClass {
        match self {
            OpenSearchError::NotFound(_) => ErrorClass::NotFound,
            OpenSearchError::Transient(_) => ErrorClass::Transient,
            OpenSearchError::Http(e) if e.is_timeout() || e.is_connect() => ErrorClass::Transient,
            OpenSearchError::Conflict(_) => ErrorClass::Conflict,
            OpenSearchError::Invalid(_) => ErrorClass::Invalid,
            OpenSearchError::Ownership(_) => ErrorClass::Ownership,
            _ => ErrorClass::Fatal,
        }
    }

    /// True when retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient | ErrorClass::Conflict)
    }

    /// True for 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, OpenSearchError::NotFound(_))
    }

    /// True for 409.
    pub fn is_conflict(&self) -> bool {
        matches!(self, OpenSearchError::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(OpenSearchError::Transient("timeout".into()).is_retryable());
        assert!(OpenSearchError::Conflict("seq_no".into()).is_retryable());
        assert!(!OpenSearchError::Invalid("bad".into()).is_retryable());
        assert!(!OpenSearchError::NotFound("x".into()).is_retryable());
        assert_eq!(OpenSearchError::Decode("x".into()).class(), ErrorClass::Fatal);
    }
}
