//! Error taxonomy for the atlas core
//!
//! Structural violations (dimension, length, unknown identifier) are caller
//! bugs and are never retried. `InsufficientData` means "not ready yet".

use thiserror::Error;

use crate::types::VectorId;

pub type Result<T> = std::result::Result<T, AtlasError>;

/// External collaborator that failed or is not configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    FeatureExtractor,
    Projector,
    LabelGenerator,
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Collaborator::FeatureExtractor => "feature extractor",
            Collaborator::Projector => "projector",
            Collaborator::LabelGenerator => "label generator",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("identifier not found: {0}")]
    NotFound(VectorId),

    #[error("length mismatch: {left} items vs {right} items")]
    LengthMismatch { left: usize, right: usize },

    #[error("insufficient data: need at least {required} vectors, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("{collaborator} unavailable: {reason}")]
    CollaboratorUnavailable {
        collaborator: Collaborator,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AtlasError {
    pub(crate) fn collaborator(collaborator: Collaborator, err: anyhow::Error) -> Self {
        AtlasError::CollaboratorUnavailable {
            collaborator,
            reason: format!("{err:#}"),
        }
    }

    /// Only collaborator failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AtlasError::CollaboratorUnavailable { .. } | AtlasError::Io(_))
    }

    /// True for the expected "dataset too small" condition.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, AtlasError::InsufficientData { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_errors_not_retryable() {
        let err = AtlasError::DimensionMismatch { expected: 4, actual: 3 };
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "dimension mismatch: expected 4, got 3");

        let err = AtlasError::LengthMismatch { left: 2, right: 1 };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_insufficient_data_is_not_ready() {
        let err = AtlasError::InsufficientData { required: 2, available: 1 };
        assert!(err.is_not_ready());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_collaborator_error_keeps_context() {
        let cause = anyhow::anyhow!("connection refused").context("invoking reducer");
        let err = AtlasError::collaborator(Collaborator::Projector, cause);
        assert!(err.is_retryable());
        let text = err.to_string();
        assert!(text.starts_with("projector unavailable"));
        assert!(text.contains("connection refused"));
    }
}
