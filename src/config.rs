// Pipeline config - feature, model and training settings
//
// Configuration is loaded from a JSON file so a training run can be
// reproduced (or swept) without recompiling. Every section falls back to
// its defaults when omitted, which mirror the reference motor fixture
// setup: 20 cepstral bands over 41 frames of 512 samples.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ModelError;

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub features: FeatureConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
}

/// One labeled source recording, relative to `DataConfig::base_dir`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecording {
    pub file: PathBuf,
    pub label: String,
}

impl SourceRecording {
    pub fn new(file: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            label: label.into(),
        }
    }
}

/// Input data locations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory that recording paths are resolved against
    pub base_dir: PathBuf,
    /// Labeled training recordings
    pub recordings: Vec<SourceRecording>,
    /// Unlabeled recordings to classify after training
    pub test_files: Vec<PathBuf>,
}

/// Cepstral feature extraction parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Cepstral coefficients per frame
    pub bands: usize,
    /// Analysis frames per window
    pub frames: usize,
    /// Raw samples between successive analysis frames
    pub hop_length: usize,
    /// FFT size of each analysis frame
    pub n_fft: usize,
    /// Mel filters before the cepstral transform
    pub n_mels: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            bands: 20,
            frames: 41,
            hop_length: 512,
            n_fft: 2048,
            n_mels: 128,
        }
    }
}

impl FeatureConfig {
    /// Raw samples covered by one feature window: `hop_length * (frames - 1)`
    pub fn window_size(&self) -> usize {
        self.hop_length * self.frames.saturating_sub(1)
    }
}

/// Sequence classifier architecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Hidden units per recurrent layer
    pub hidden_size: usize,
    /// Number of stacked recurrent layers
    pub num_layers: usize,
    /// Standardize each band with statistics fitted on the training split
    pub standardize_inputs: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_size: 64,
            num_layers: 2,
            standardize_inputs: true,
        }
    }
}

/// Optimization loop parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub iterations: usize,
    /// Report mini-batch loss/accuracy every N iterations
    pub display_step: usize,
    /// Probability of keeping a recurrent input during training (1.0 disables dropout)
    pub keep_probability: f32,
    /// Fraction of the corpus held out for evaluation
    pub eval_fraction: f32,
    /// Seed for the corpus split and optional epoch shuffling
    pub random_seed: u64,
    /// Reshuffle the training split at every epoch boundary
    pub shuffle_each_epoch: bool,
    /// Directory to persist the trained model into
    pub checkpoint: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.005,
            batch_size: 32,
            iterations: 400,
            display_step: 50,
            keep_probability: 0.8,
            eval_fraction: 0.2,
            random_seed: 42,
            shuffle_each_epoch: false,
            checkpoint: None,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.batch_size == 0 {
            return Err(ModelError::invalid_config("batch_size must be > 0"));
        }
        if self.iterations == 0 {
            return Err(ModelError::invalid_config("iterations must be > 0"));
        }
        if self.display_step == 0 {
            return Err(ModelError::invalid_config("display_step must be > 0"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ModelError::invalid_config(format!(
                "learning_rate must be positive (got {})",
                self.learning_rate
            )));
        }
        if !(self.keep_probability > 0.0 && self.keep_probability <= 1.0) {
            return Err(ModelError::invalid_config(format!(
                "keep_probability must be in (0, 1] (got {})",
                self.keep_probability
            )));
        }
        if !(self.eval_fraction > 0.0 && self.eval_fraction < 1.0) {
            return Err(ModelError::invalid_config(format!(
                "eval_fraction must be in (0, 1) (got {})",
                self.eval_fraction
            )));
        }
        Ok(())
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.bands == 0 {
            return Err(ModelError::invalid_config("bands must be > 0"));
        }
        if self.frames < 2 {
            return Err(ModelError::invalid_config("frames must be >= 2"));
        }
        if self.hop_length == 0 {
            return Err(ModelError::invalid_config("hop_length must be > 0"));
        }
        if self.n_fft < 2 || self.n_fft % 2 != 0 {
            return Err(ModelError::invalid_config(format!(
                "n_fft must be even and >= 2 (got {})",
                self.n_fft
            )));
        }
        if self.n_mels < self.bands {
            return Err(ModelError::invalid_config(format!(
                "n_mels ({}) must be >= bands ({})",
                self.n_mels, self.bands
            )));
        }
        // Reflect padding needs more samples than the pad width.
        if self.window_size() <= self.n_fft / 2 {
            return Err(ModelError::invalid_config(format!(
                "window of {} samples is too short for n_fft {}",
                self.window_size(),
                self.n_fft
            )));
        }
        Ok(())
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.hidden_size == 0 {
            return Err(ModelError::invalid_config("hidden_size must be > 0"));
        }
        if self.num_layers == 0 {
            return Err(ModelError::invalid_config("num_layers must be > 0"));
        }
        Ok(())
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    ///
    /// Relative `data.base_dir` values are resolved against the directory
    /// holding the config file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: PipelineConfig = serde_json::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;

        if config.data.base_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.data.base_dir = parent.join(&config.data.base_dir);
            }
        }

        log::info!(
            "[Config] Loaded configuration from {:?} ({} recordings)",
            path,
            config.data.recordings.len()
        );
        Ok(config)
    }

    /// Write configuration as pretty JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    /// Check every section for out-of-range values
    pub fn validate(&self) -> Result<(), ModelError> {
        self.features.validate()?;
        self.model.validate()?;
        self.training.validate()
    }
}
