//! Controller-specific error types.
//!
//! Errors from the Kubernetes API, the OpenSearch admin gateway and the
//! patch engine are wrapped here. [`ErrorKind`] projects every error onto
//! the operator's error taxonomy; the kind is what ends up as the reason of
//! a `Ready=False` condition.

use kube::Error as KubeError;
use object_patch::PatchError;
use opensearch_client::{ErrorClass, OpenSearchError};
use thiserror::Error;

/// Errors that can occur in the OpenSearch operator.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// OpenSearch admin API error
    #[error("OpenSearch error: {0}")]
    OpenSearch(#[from] OpenSearchError),

    /// Patch calculation failed
    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    /// Object could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Referenced OpenSearchCluster does not exist
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Certificate generation failed
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Finalizer bookkeeping failed
    #[error("Finalizer error: {0}")]
    Finalizer(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

/// Error taxonomy shared by all reconcilers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Object absent
    NotFound,
    /// Network, 5xx or timeout; retried with backoff
    Transient,
    /// Optimistic concurrency failure
    Conflict,
    /// Rejected by the server as invalid
    Invalid,
    /// Remote object owned by someone else
    Ownership,
    /// Decode failures and anything unexpected
    Fatal,
}

impl ErrorKind {
    /// Condition reason for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Transient => "Transient",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Invalid => "Invalid",
            ErrorKind::Ownership => "Ownership",
            ErrorKind::Fatal => "Fatal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ControllerError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControllerError::Kube(KubeError::Api(ae)) => match ae.code {
                404 => ErrorKind::NotFound,
                409 => ErrorKind::Conflict,
                400 | 422 => ErrorKind::Invalid,
                code if code >= 500 => ErrorKind::Transient,
                _ => ErrorKind::Fatal,
            },
            ControllerError::Kube(_) => ErrorKind::Transient,
            ControllerError::OpenSearch(e) => match e.class() {
                ErrorClass::NotFound => ErrorKind::NotFound,
                ErrorClass::Transient => ErrorKind::Transient,
                ErrorClass::Conflict => ErrorKind::Conflict,
                ErrorClass::Invalid => ErrorKind::Invalid,
                ErrorClass::Ownership => ErrorKind::Ownership,
                ErrorClass::Fatal => ErrorKind::Fatal,
            },
            ControllerError::ClusterNotFound(_) => ErrorKind::NotFound,
            ControllerError::InvalidConfig(_) => ErrorKind::Invalid,
            ControllerError::Patch(_)
            | ControllerError::Serialization(_)
            | ControllerError::Certificate(_)
            | ControllerError::Finalizer(_)
            | ControllerError::Watch(_) => ErrorKind::Fatal,
        }
    }

    /// First line of the message, for condition messages.
    pub fn one_line(&self) -> String {
        self.to_string().lines().next().unwrap_or_default().to_string()
    }
}

/// True when a Kubernetes error is a 404.
pub fn is_kube_not_found(error: &KubeError) -> bool {
    matches!(error, KubeError::Api(ae) if ae.code == 404)
}

/// True when a Kubernetes error is a 409.
pub fn is_kube_conflict(error: &KubeError) -> bool {
    matches!(error, KubeError::Api(ae) if ae.code == 409)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_errors_keep_their_class() {
        let err = ControllerError::from(OpenSearchError::Conflict("version changed".to_string()));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = ControllerError::from(OpenSearchError::Ownership("uid mismatch".to_string()));
        assert_eq!(err.kind(), ErrorKind::Ownership);
    }

    #[test]
    fn test_missing_cluster_is_not_found() {
        let err = ControllerError::ClusterNotFound("search/logs".to_string());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.kind().to_string(), "NotFound");
        assert_eq!(err.one_line(), "cluster not found: search/logs");
    }
}
