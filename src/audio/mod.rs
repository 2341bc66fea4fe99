// Audio module - recordings and decoding
//
// Decoding is a collaborator behind the `AudioDecoder` trait so the dataset
// builder can be driven from WAV files on disk or from in-memory fixtures.

mod decode;

pub use decode::{write_wav, WavDecoder};

use std::path::Path;

use crate::error::AudioError;

/// Mono sample sequence with its sample rate and optional class label
///
/// A `None` label marks an unlabeled recording submitted for inference.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecording {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub label: Option<String>,
}

impl RawRecording {
    pub fn new(samples: Vec<f32>, sample_rate: u32, label: Option<String>) -> Self {
        Self {
            samples,
            sample_rate,
            label,
        }
    }

    /// Recording duration in seconds
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Attach a class label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Decodes file bytes into a mono sample sequence with a known sample rate
pub trait AudioDecoder: Send + Sync {
    /// # Returns
    /// * `Err(AudioError::UnreadableAudio)` - missing, corrupt or unsupported file
    fn decode(&self, path: &Path) -> Result<RawRecording, AudioError>;
}
