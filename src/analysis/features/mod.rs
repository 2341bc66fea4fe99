// FeatureExtractor - cepstral feature windows for motor sound classification
//
// This module turns one recording into a sequence of fixed-shape MFCC
// windows. The whole recording is normalized first, then sliced into 50%
// overlapping windows of `hop * (frames - 1)` samples. Each window goes
// through a centered STFT, a mel filterbank, a dB conversion and a DCT.
//
// Module organization:
// - types: FeatureWindow matrix
// - fft: power spectra with Hann windowing
// - mel: mel filterbank, dB conversion, cepstral transform
// - mod.rs: Coordinator (FeatureExtractor)
//
// References:
// - Davis, S. & Mermelstein, P. (1980). Comparison of parametric
//   representations for monosyllabic word recognition
// - McFee, B. et al. (2015). librosa: Audio and music signal analysis in Python

mod fft;
mod mel;
mod types;

pub use types::FeatureWindow;

use fft::FftProcessor;
use mel::{power_to_db, CepstralTransform, MelFilterbank};

use crate::analysis::normalize::normalize;
use crate::analysis::windows::WindowGenerator;
use crate::audio::RawRecording;
use crate::config::FeatureConfig;
use crate::error::{AudioError, ModelError};

/// FeatureExtractor coordinates the MFCC pipeline
///
/// Extraction is a pure function of the recording and the configuration,
/// so one extractor can be shared across worker threads.
pub struct FeatureExtractor {
    config: FeatureConfig,
    fft_processor: FftProcessor,
    cepstral: CepstralTransform,
}

impl FeatureExtractor {
    /// Create an extractor for a validated feature configuration
    ///
    /// # Returns
    /// * `Err(ModelError::InvalidConfig)` - shape parameters out of range
    pub fn new(config: FeatureConfig) -> Result<Self, ModelError> {
        config.validate()?;
        Ok(Self {
            fft_processor: FftProcessor::new(config.n_fft),
            cepstral: CepstralTransform::new(config.n_mels, config.bands),
            config,
        })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Raw samples per window
    pub fn window_size(&self) -> usize {
        self.config.window_size()
    }

    /// Extract feature windows from a recording
    ///
    /// Normalization happens eagerly; windows are computed lazily as the
    /// returned iterator is advanced.
    ///
    /// # Returns
    /// * `Err(AudioError::DegenerateSignal)` - constant or empty recording
    pub fn extract(&self, recording: &RawRecording) -> Result<FeatureWindows<'_>, AudioError> {
        let samples = normalize(&recording.samples)?;
        let windows = WindowGenerator::new(samples.len(), self.window_size());
        let filterbank = MelFilterbank::new(
            recording.sample_rate,
            self.config.n_fft,
            self.config.n_mels,
        );

        Ok(FeatureWindows {
            extractor: self,
            filterbank,
            samples,
            windows,
        })
    }

    /// Compute the MFCC matrix of one window of normalized samples
    fn window_features(&self, filterbank: &MelFilterbank, segment: &[f32]) -> FeatureWindow {
        let spectra = self
            .fft_processor
            .stft_power(segment, self.config.hop_length);

        let mut mel_frames: Vec<Vec<f32>> =
            spectra.iter().map(|power| filterbank.apply(power)).collect();
        power_to_db(&mut mel_frames);

        let mut values = Vec::with_capacity(self.config.frames * self.config.bands);
        for frame in mel_frames.iter().take(self.config.frames) {
            self.cepstral.apply(frame, &mut values);
        }

        FeatureWindow::from_rows(self.config.frames, self.config.bands, values)
            .unwrap_or_else(|| unreachable!("validated config yields {} frames", self.config.frames))
    }
}

/// Lazy sequence of feature windows over one normalized recording
pub struct FeatureWindows<'a> {
    extractor: &'a FeatureExtractor,
    filterbank: MelFilterbank,
    samples: Vec<f32>,
    windows: WindowGenerator,
}

impl Iterator for FeatureWindows<'_> {
    type Item = FeatureWindow;

    fn next(&mut self) -> Option<Self::Item> {
        for (start, end) in self.windows.by_ref() {
            // Short tail windows are dropped, never padded.
            if end > self.samples.len() {
                continue;
            }
            let segment = &self.samples[start..end];
            return Some(self.extractor.window_features(&self.filterbank, segment));
        }
        None
    }
}
