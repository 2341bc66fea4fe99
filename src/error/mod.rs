// Error types for the motor sound classifier
//
// This module defines coded error types for audio ingestion and model
// operations, so callers (CLI, batch jobs) can branch on stable numeric codes.

mod audio;
mod model;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use model::{log_model_error, ModelError, ModelErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent reporting from the CLI
/// and from log lines.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_trait_objects() {
        let audio_err: &dyn ErrorCode = &AudioError::DegenerateSignal {
            reason: "constant".to_string(),
        };
        assert_eq!(audio_err.code(), AudioErrorCodes::DEGENERATE_SIGNAL);

        let model_err: &dyn ErrorCode = &ModelError::EmptyDataset;
        assert_eq!(model_err.code(), ModelErrorCodes::EMPTY_DATASET);
    }

    #[test]
    fn test_code_ranges_do_not_overlap() {
        let audio = [
            AudioErrorCodes::UNREADABLE_AUDIO,
            AudioErrorCodes::DEGENERATE_SIGNAL,
        ];
        let model = [
            ModelErrorCodes::SHAPE_MISMATCH,
            ModelErrorCodes::CHECKPOINT_IO,
            ModelErrorCodes::NON_FINITE_LOSS,
            ModelErrorCodes::INVALID_CONFIG,
            ModelErrorCodes::EMPTY_DATASET,
            ModelErrorCodes::EMPTY_PREDICTION,
            ModelErrorCodes::BACKEND,
        ];
        assert!(audio.iter().all(|code| (1001..2000).contains(code)));
        assert!(model.iter().all(|code| (2001..3000).contains(code)));
    }
}
