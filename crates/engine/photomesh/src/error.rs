//! Pipeline failure kinds and their mapping onto the wire

use crate::decode::DecodeError;
use crate::mesh::glb::GlbError;
use crate::model::ModelError;
use crate::pipeline::Outcome;
use crate::preprocess::PreprocessError;
use crate::types::GenerateResponse;
use std::fmt;
use thiserror::Error;

/// Fixed message returned while the model is still loading
pub const NOT_READY_MESSAGE: &str = "Model is not ready";

/// Message used in place of inference error details when they are hidden
pub const GENERIC_INFERENCE_MESSAGE: &str = "Inference failed";

/// A single field outside its declared range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// One or more request fields failed their range checks
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationError {
    violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    /// A validation error for input that could not be parsed at all
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(vec![FieldViolation::new("body", message)])
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect();
        write!(f, "Invalid request: {}", parts.join("; "))
    }
}

/// Every way a generation request can fail
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Image too large: {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("{0}")]
    InvalidImage(String),

    #[error("{0}")]
    Inference(String),

    #[error("{}", NOT_READY_MESSAGE)]
    NotReady,
}

impl PipelineError {
    /// Whether this failure is reported at the transport level
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PipelineError::Validation(_) | PipelineError::PayloadTooLarge { .. }
        )
    }

    /// Terminal mapping from failure kind to what the caller receives
    pub fn into_outcome(self, expose_details: bool) -> Outcome {
        match self {
            PipelineError::Validation(err) => Outcome::Rejected(Rejection::Validation(err)),
            PipelineError::PayloadTooLarge { size, limit } => {
                Outcome::Rejected(Rejection::PayloadTooLarge { size, limit })
            }
            PipelineError::Inference(_) if !expose_details => {
                Outcome::Responded(GenerateResponse::failed(GENERIC_INFERENCE_MESSAGE))
            }
            other => Outcome::Responded(GenerateResponse::failed(other.to_string())),
        }
    }
}

impl From<DecodeError> for PipelineError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::TooLarge { size, limit } => PipelineError::PayloadTooLarge { size, limit },
            other => PipelineError::InvalidImage(other.to_string()),
        }
    }
}

impl From<PreprocessError> for PipelineError {
    fn from(err: PreprocessError) -> Self {
        PipelineError::Inference(err.to_string())
    }
}

impl From<ModelError> for PipelineError {
    fn from(err: ModelError) -> Self {
        PipelineError::Inference(err.to_string())
    }
}

impl From<GlbError> for PipelineError {
    fn from(err: GlbError) -> Self {
        PipelineError::Inference(err.to_string())
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        PipelineError::Inference(format!("Failed to encode preview: {err}"))
    }
}

/// A request refused before any image work began
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error(transparent)]
    Validation(ValidationError),

    #[error("Image too large: {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_kinds() {
        assert!(PipelineError::from(ValidationError::malformed("bad")).is_rejection());
        assert!(PipelineError::PayloadTooLarge { size: 2, limit: 1 }.is_rejection());
        assert!(!PipelineError::InvalidImage("x".into()).is_rejection());
        assert!(!PipelineError::Inference("x".into()).is_rejection());
        assert!(!PipelineError::NotReady.is_rejection());
    }

    #[test]
    fn test_not_ready_maps_to_fixed_message() {
        match PipelineError::NotReady.into_outcome(true) {
            Outcome::Responded(response) => {
                assert!(!response.success);
                assert_eq!(response.error.as_deref(), Some(NOT_READY_MESSAGE));
            }
            Outcome::Rejected(_) => panic!("not-ready must not be a transport rejection"),
        }
    }

    #[test]
    fn test_inference_message_forwarded_verbatim() {
        match PipelineError::Inference("mesh exploded".into()).into_outcome(true) {
            Outcome::Responded(response) => {
                assert_eq!(response.error.as_deref(), Some("mesh exploded"))
            }
            Outcome::Rejected(_) => panic!("inference errors are structured failures"),
        }
    }

    #[test]
    fn test_inference_message_hidden() {
        match PipelineError::Inference("/opt/weights missing".into()).into_outcome(false) {
            Outcome::Responded(response) => {
                assert_eq!(response.error.as_deref(), Some(GENERIC_INFERENCE_MESSAGE))
            }
            Outcome::Rejected(_) => panic!("inference errors are structured failures"),
        }
    }

    #[test]
    fn test_too_large_decode_error_becomes_rejection() {
        let err = PipelineError::from(DecodeError::TooLarge { size: 10, limit: 5 });
        assert!(matches!(
            err.into_outcome(true),
            Outcome::Rejected(Rejection::PayloadTooLarge { size: 10, limit: 5 })
        ));
    }
}
