//! Error types for the patch engine

use thiserror::Error;

/// Patch engine errors
#[derive(Debug, Error)]
pub enum PatchError {
    /// JSON (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Gzip compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),

    /// The last-applied annotation could not be decoded
    #[error("Invalid last-applied annotation: {0}")]
    InvalidAnnotation(String),
}
