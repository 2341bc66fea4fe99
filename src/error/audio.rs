// Audio error types and constants

use crate::error::ErrorCode;
use log::error;
use std::path::Path;
use thiserror::Error;

/// Audio error code constants
///
/// Error code range: 1001-1003
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    /// File could not be opened or decoded
    pub const UNREADABLE_AUDIO: i32 = 1001;

    /// Signal is silent, constant, or empty
    pub const DEGENERATE_SIGNAL: i32 = 1002;

    /// Output file or directory could not be written
    pub const WRITE_FAILED: i32 = 1003;
}

/// Log an audio error with structured context
///
/// Per-recording audio errors are skip-and-report: the caller logs them
/// here and moves on to the next recording.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=AudioIngest, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-related errors
///
/// These errors cover decoding recordings from disk and preparing their
/// samples for feature extraction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AudioError {
    /// Corrupt, missing, or unsupported audio file
    #[error("unreadable audio {path}: {reason}")]
    UnreadableAudio { path: String, reason: String },

    /// Zero-variance or empty signal that cannot be normalized
    #[error("degenerate signal: {reason}")]
    DegenerateSignal { reason: String },

    /// Recording could not be written to disk
    #[error("cannot write {path}: {reason}")]
    WriteFailed { path: String, reason: String },
}

impl AudioError {
    pub(crate) fn unreadable(path: &Path, reason: impl ToString) -> Self {
        AudioError::UnreadableAudio {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write_failed(path: &Path, reason: impl ToString) -> Self {
        AudioError::WriteFailed {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::UnreadableAudio { .. } => AudioErrorCodes::UNREADABLE_AUDIO,
            AudioError::DegenerateSignal { .. } => AudioErrorCodes::DEGENERATE_SIGNAL,
            AudioError::WriteFailed { .. } => AudioErrorCodes::WRITE_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::UnreadableAudio { path, reason } => {
                format!("Cannot decode {}: {}", path, reason)
            }
            AudioError::DegenerateSignal { reason } => {
                format!("Signal cannot be normalized: {}", reason)
            }
            AudioError::WriteFailed { path, reason } => {
                format!("Cannot write {}: {}", path, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_codes() {
        let unreadable = AudioError::unreadable(Path::new("motor.wav"), "bad header");
        assert_eq!(unreadable.code(), 1001);
        assert_eq!(
            AudioError::DegenerateSignal {
                reason: "constant".to_string()
            }
            .code(),
            1002
        );
        assert_eq!(
            AudioError::write_failed(Path::new("out/new_0.wav"), "read-only").code(),
            1003
        );
    }

    #[test]
    fn test_unreadable_message_names_path() {
        let err = AudioError::unreadable(Path::new("data/red_1.wav"), "truncated");
        assert!(err.message().contains("data/red_1.wav"));
        assert!(err.to_string().contains("truncated"));
        log_audio_error(&err, "test");
    }
}
