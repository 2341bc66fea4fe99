// Model error types and constants

use crate::error::ErrorCode;
use log::error;
use thiserror::Error;

/// Model error code constants
///
/// Error code range: 2001-2007
pub struct ModelErrorCodes {}

impl ModelErrorCodes {
    /// Feature window with the wrong `frames` or `bands`
    pub const SHAPE_MISMATCH: i32 = 2001;

    /// Checkpoint could not be written or read
    pub const CHECKPOINT_IO: i32 = 2002;

    /// Training loss became NaN or infinite
    pub const NON_FINITE_LOSS: i32 = 2003;

    /// Configuration value out of range
    pub const INVALID_CONFIG: i32 = 2004;

    /// No feature windows were produced for training
    pub const EMPTY_DATASET: i32 = 2005;

    /// Aggregation requested over zero windows
    pub const EMPTY_PREDICTION: i32 = 2006;

    /// Tensor backend failure
    pub const BACKEND: i32 = 2007;
}

/// Log a model error with structured context
pub fn log_model_error(err: &ModelError, context: &str) {
    error!(
        "Model error in {}: code={}, component=SequenceClassifier, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Model, training and checkpoint errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// Window shape does not match the classifier's configured input
    #[error("shape mismatch: expected {expected_frames}x{expected_bands}, got {frames}x{bands}")]
    ShapeMismatch {
        expected_frames: usize,
        expected_bands: usize,
        frames: usize,
        bands: usize,
    },

    /// Checkpoint save/load failure
    #[error("checkpoint I/O failed for {path}: {reason}")]
    CheckpointIo { path: String, reason: String },

    /// Loss diverged during optimization
    #[error("non-finite loss {loss} at iteration {iteration}")]
    NonFiniteLoss { iteration: usize, loss: f32 },

    /// Configuration value out of range
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Dataset builder produced no windows
    #[error("dataset is empty")]
    EmptyDataset,

    /// Aggregator received no predictions
    #[error("no predictions to aggregate")]
    EmptyPrediction,

    /// Error raised by the tensor backend
    #[error("tensor backend: {details}")]
    Backend { details: String },
}

impl ModelError {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        ModelError::InvalidConfig {
            reason: reason.into(),
        }
    }
}

impl From<candle_core::Error> for ModelError {
    fn from(err: candle_core::Error) -> Self {
        ModelError::Backend {
            details: err.to_string(),
        }
    }
}

impl ErrorCode for ModelError {
    fn code(&self) -> i32 {
        match self {
            ModelError::ShapeMismatch { .. } => ModelErrorCodes::SHAPE_MISMATCH,
            ModelError::CheckpointIo { .. } => ModelErrorCodes::CHECKPOINT_IO,
            ModelError::NonFiniteLoss { .. } => ModelErrorCodes::NON_FINITE_LOSS,
            ModelError::InvalidConfig { .. } => ModelErrorCodes::INVALID_CONFIG,
            ModelError::EmptyDataset => ModelErrorCodes::EMPTY_DATASET,
            ModelError::EmptyPrediction => ModelErrorCodes::EMPTY_PREDICTION,
            ModelError::Backend { .. } => ModelErrorCodes::BACKEND,
        }
    }

    fn message(&self) -> String {
        match self {
            ModelError::ShapeMismatch {
                expected_frames,
                expected_bands,
                frames,
                bands,
            } => format!(
                "Feature window is {}x{} but the classifier expects {}x{}",
                frames, bands, expected_frames, expected_bands
            ),
            ModelError::CheckpointIo { path, reason } => {
                format!("Checkpoint {} failed: {}", path, reason)
            }
            ModelError::NonFiniteLoss { iteration, loss } => {
                format!("Loss became {} at iteration {}", loss, iteration)
            }
            ModelError::InvalidConfig { reason } => format!("Invalid configuration: {}", reason),
            ModelError::EmptyDataset => "No feature windows were extracted".to_string(),
            ModelError::EmptyPrediction => "Cannot aggregate an empty prediction batch".to_string(),
            ModelError::Backend { details } => format!("Tensor backend error: {}", details),
        }
    }
}
