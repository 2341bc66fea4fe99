// Sequence classifier - stacked LSTM over feature windows
//
// Architecture:
// - optional per-band input standardization (statistics fitted on the
//   training split, stored with the checkpoint)
// - RecurrentStack: `num_layers` LSTM cells consuming one frame per step
// - Linear head on the last step's top-layer state, then softmax
//
// Each classifier owns its parameters (`VarMap`) and device. Nothing is
// global, so several classifiers can be built side by side for sweeps.

pub mod checkpoint;
mod recurrent;

pub use recurrent::{RecurrentLayerSpec, RecurrentStack};

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{linear, Linear, Module, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};

use crate::analysis::features::FeatureWindow;
use crate::config::{FeatureConfig, ModelConfig};
use crate::dataset::ClassVocabulary;
use crate::error::ModelError;

/// Floor for per-band standard deviations when standardizing inputs
const MIN_BAND_STD: f32 = 1e-6;

/// Shape of the classifier; persisted in the checkpoint manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Feature transform the classifier was trained on
    pub features: FeatureConfig,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub num_classes: usize,
    pub standardize_inputs: bool,
}

impl ClassifierConfig {
    pub fn new(features: &FeatureConfig, model: &ModelConfig, num_classes: usize) -> Self {
        Self {
            features: features.clone(),
            hidden_size: model.hidden_size,
            num_layers: model.num_layers,
            num_classes,
            standardize_inputs: model.standardize_inputs,
        }
    }

    pub fn frames(&self) -> usize {
        self.features.frames
    }

    pub fn bands(&self) -> usize {
        self.features.bands
    }

    /// One spec per layer: the first reads `bands`, the rest read `hidden_size`
    pub fn layer_specs(&self) -> Vec<RecurrentLayerSpec> {
        (0..self.num_layers)
            .map(|i| RecurrentLayerSpec {
                input_size: if i == 0 { self.bands() } else { self.hidden_size },
                hidden_size: self.hidden_size,
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        self.features.validate()?;
        if self.hidden_size == 0 || self.num_layers == 0 {
            return Err(ModelError::invalid_config(
                "hidden_size and num_layers must be > 0",
            ));
        }
        if self.num_classes < 2 {
            return Err(ModelError::invalid_config(format!(
                "need at least 2 classes (got {})",
                self.num_classes
            )));
        }
        Ok(())
    }
}

/// Probability of keeping a recurrent input; `1.0` disables dropout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeepProbability(f32);

impl KeepProbability {
    /// Evaluation/inference setting
    pub const ALL: KeepProbability = KeepProbability(1.0);

    pub fn new(keep: f32) -> Result<Self, ModelError> {
        if keep > 0.0 && keep <= 1.0 {
            Ok(Self(keep))
        } else {
            Err(ModelError::invalid_config(format!(
                "keep probability must be in (0, 1] (got {keep})"
            )))
        }
    }

    pub fn value(self) -> f32 {
        self.0
    }

    pub fn drop_rate(self) -> f32 {
        1.0 - self.0
    }

    pub fn is_dropout(self) -> bool {
        self.0 < 1.0
    }
}

/// Per-band mean and standard deviation of the training windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputScaler {
    pub mean: Vec<f32>,
    pub std_dev: Vec<f32>,
}

impl InputScaler {
    /// Fit statistics over every frame of every window
    pub fn fit<'a>(windows: impl IntoIterator<Item = &'a FeatureWindow>, bands: usize) -> Self {
        let mut sum = vec![0.0f64; bands];
        let mut sum_sq = vec![0.0f64; bands];
        let mut count = 0usize;

        for window in windows {
            for row in window.values().chunks_exact(bands) {
                for (b, &v) in row.iter().enumerate() {
                    sum[b] += v as f64;
                    sum_sq[b] += (v as f64) * (v as f64);
                }
                count += 1;
            }
        }

        if count == 0 {
            return Self {
                mean: vec![0.0; bands],
                std_dev: vec![1.0; bands],
            };
        }

        let n = count as f64;
        let mean: Vec<f32> = sum.iter().map(|s| (s / n) as f32).collect();
        let std_dev = sum
            .iter()
            .zip(&sum_sq)
            .map(|(s, sq)| {
                let m = s / n;
                let std = ((sq / n) - m * m).max(0.0).sqrt() as f32;
                if std < MIN_BAND_STD {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        Self { mean, std_dev }
    }
}

struct ScalerTensors {
    scaler: InputScaler,
    mean: Tensor,
    inv_std: Tensor,
}

impl ScalerTensors {
    fn new(scaler: InputScaler, device: &Device) -> Result<Self, ModelError> {
        let bands = scaler.mean.len();
        let inv: Vec<f32> = scaler.std_dev.iter().map(|s| 1.0 / s).collect();
        Ok(Self {
            mean: Tensor::from_slice(&scaler.mean, (1, 1, bands), device)?,
            inv_std: Tensor::from_vec(inv, (1, 1, bands), device)?,
            scaler,
        })
    }

    fn apply(&self, inputs: &Tensor) -> candle_core::Result<Tensor> {
        inputs.broadcast_sub(&self.mean)?.broadcast_mul(&self.inv_std)
    }
}

/// One probability distribution per input window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionBatch {
    rows: Vec<Vec<f32>>,
}

impl PredictionBatch {
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    /// Class with the highest probability in each row; ties go to the lower index
    pub fn argmax(&self) -> Vec<usize> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0usize, f32::NEG_INFINITY), |best, (i, &p)| {
                        if p > best.1 {
                            (i, p)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect()
    }
}

/// Stacked-LSTM classifier over `frames × bands` feature windows
pub struct SequenceClassifier {
    config: ClassifierConfig,
    vocabulary: ClassVocabulary,
    device: Device,
    varmap: VarMap,
    stack: RecurrentStack,
    head: Linear,
    scaler: Option<ScalerTensors>,
}

impl std::fmt::Debug for SequenceClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceClassifier")
            .field("config", &self.config)
            .field("vocabulary", &self.vocabulary)
            .field("standardized", &self.scaler.is_some())
            .finish_non_exhaustive()
    }
}

impl SequenceClassifier {
    /// Create a classifier with freshly initialized parameters on the CPU
    pub fn new(config: ClassifierConfig, vocabulary: ClassVocabulary) -> Result<Self, ModelError> {
        config.validate()?;
        if vocabulary.len() != config.num_classes {
            return Err(ModelError::invalid_config(format!(
                "vocabulary has {} classes, model expects {}",
                vocabulary.len(),
                config.num_classes
            )));
        }

        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let stack = RecurrentStack::new(&config.layer_specs(), vb.pp("recurrent"))?;
        let head = linear(config.hidden_size, config.num_classes, vb.pp("head"))?;

        log::debug!(
            "Created classifier: {} LSTM layers x {} hidden, {} classes",
            stack.depth(),
            config.hidden_size,
            config.num_classes
        );

        Ok(Self {
            config,
            vocabulary,
            device,
            varmap,
            stack,
            head,
            scaler: None,
        })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> &ClassVocabulary {
        &self.vocabulary
    }

    /// Reject windows produced by any other feature transform
    ///
    /// Matching `frames × bands` is not enough: a different hop, FFT size
    /// or mel count yields windows of the right shape but different meaning.
    pub fn check_feature_config(&self, features: &FeatureConfig) -> Result<(), ModelError> {
        if features != &self.config.features {
            return Err(ModelError::invalid_config(format!(
                "feature settings {:?} differ from the trained {:?}",
                features, self.config.features
            )));
        }
        Ok(())
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub(crate) fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub(crate) fn varmap_mut(&mut self) -> &mut VarMap {
        &mut self.varmap
    }

    pub fn scaler(&self) -> Option<&InputScaler> {
        self.scaler.as_ref().map(|s| &s.scaler)
    }

    /// Install input standardization statistics
    pub fn set_scaler(&mut self, scaler: InputScaler) -> Result<(), ModelError> {
        if scaler.mean.len() != self.config.bands() || scaler.std_dev.len() != self.config.bands() {
            return Err(ModelError::invalid_config(format!(
                "scaler has {} bands, model expects {}",
                scaler.mean.len(),
                self.config.bands()
            )));
        }
        self.scaler = Some(ScalerTensors::new(scaler, &self.device)?);
        Ok(())
    }

    /// Stack windows into a `(batch, frames, bands)` tensor
    ///
    /// # Returns
    /// * `Err(ModelError::ShapeMismatch)` - any window has the wrong shape
    pub fn windows_tensor<'a>(
        &self,
        windows: impl IntoIterator<Item = &'a FeatureWindow>,
    ) -> Result<Tensor, ModelError> {
        let mut data = Vec::new();
        let mut batch = 0usize;
        for window in windows {
            self.check_shape(window.frames(), window.bands())?;
            data.extend_from_slice(window.values());
            batch += 1;
        }
        Ok(Tensor::from_vec(
            data,
            (batch, self.config.frames(), self.config.bands()),
            &self.device,
        )?)
    }

    fn check_shape(&self, frames: usize, bands: usize) -> Result<(), ModelError> {
        if frames != self.config.frames() || bands != self.config.bands() {
            return Err(ModelError::ShapeMismatch {
                expected_frames: self.config.frames(),
                expected_bands: self.config.bands(),
                frames,
                bands,
            });
        }
        Ok(())
    }

    /// Unnormalized class scores for a `(batch, frames, bands)` input
    pub fn forward(&self, inputs: &Tensor, keep: KeepProbability) -> Result<Tensor, ModelError> {
        let (_, frames, bands) = inputs.dims3()?;
        self.check_shape(frames, bands)?;

        let scaled;
        let inputs = match &self.scaler {
            Some(scaler) => {
                scaled = scaler.apply(inputs)?;
                &scaled
            }
            None => inputs,
        };

        let last = self.stack.forward_last(inputs, keep)?;
        Ok(self.head.forward(&last)?)
    }

    /// Class probabilities with dropout disabled
    pub fn predict_tensor(&self, inputs: &Tensor) -> Result<Tensor, ModelError> {
        let logits = self.forward(inputs, KeepProbability::ALL)?;
        Ok(candle_nn::ops::softmax(&logits, D::Minus1)?)
    }

    /// One probability distribution per window
    pub fn predict(&self, windows: &[FeatureWindow]) -> Result<PredictionBatch, ModelError> {
        if windows.is_empty() {
            return Ok(PredictionBatch::from_rows(Vec::new()));
        }
        let inputs = self.windows_tensor(windows)?;
        let probabilities = self.predict_tensor(&inputs)?;
        Ok(PredictionBatch::from_rows(probabilities.to_vec2::<f32>()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ClassifierConfig {
        ClassifierConfig {
            features: FeatureConfig {
                frames: 5,
                bands: 4,
                ..FeatureConfig::default()
            },
            hidden_size: 8,
            num_layers: 2,
            num_classes: 3,
            standardize_inputs: false,
        }
    }

    fn vocabulary() -> ClassVocabulary {
        ClassVocabulary::from_labels(["new", "used", "red"])
    }

    fn window(frames: usize, bands: usize, seed: f32) -> FeatureWindow {
        let values = (0..frames * bands)
            .map(|i| ((i as f32 + seed) * 0.37).sin() * 3.0)
            .collect();
        FeatureWindow::from_rows(frames, bands, values).unwrap()
    }

    #[test]
    fn test_layer_specs_chain_widths() {
        let specs = small_config().layer_specs();
        assert_eq!(
            specs,
            vec![
                RecurrentLayerSpec { input_size: 4, hidden_size: 8 },
                RecurrentLayerSpec { input_size: 8, hidden_size: 8 },
            ]
        );
    }

    #[test]
    fn test_predictions_are_distributions() {
        let classifier = SequenceClassifier::new(small_config(), vocabulary()).unwrap();
        let windows: Vec<_> = (0..7).map(|i| window(5, 4, i as f32)).collect();
        let batch = classifier.predict(&windows).unwrap();

        assert_eq!(batch.len(), 7);
        for row in batch.rows() {
            assert_eq!(row.len(), 3);
            assert!(row.iter().all(|&p| p >= 0.0));
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "row sums to {sum}");
        }
    }

    #[test]
    fn test_prediction_is_repeatable_without_dropout() {
        let classifier = SequenceClassifier::new(small_config(), vocabulary()).unwrap();
        let windows = vec![window(5, 4, 1.0), window(5, 4, 2.0)];
        assert_eq!(
            classifier.predict(&windows).unwrap(),
            classifier.predict(&windows).unwrap()
        );
    }

    #[test]
    fn test_state_resets_between_windows() {
        let classifier = SequenceClassifier::new(small_config(), vocabulary()).unwrap();
        let a = window(5, 4, 1.0);
        let b = window(5, 4, 9.0);
        let alone = classifier.predict(std::slice::from_ref(&b)).unwrap();
        let after_a = classifier.predict(&[a, b]).unwrap();
        for (x, y) in alone.rows()[0].iter().zip(&after_a.rows()[1]) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_wrong_shape_fails_fast() {
        let classifier = SequenceClassifier::new(small_config(), vocabulary()).unwrap();
        let err = classifier
            .predict(&[window(5, 4, 0.0), window(6, 4, 0.0)])
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::ShapeMismatch {
                expected_frames: 5,
                expected_bands: 4,
                frames: 6,
                bands: 4
            }
        );
        assert!(matches!(
            classifier.predict(&[window(5, 3, 0.0)]),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_batch_predicts_nothing() {
        let classifier = SequenceClassifier::new(small_config(), vocabulary()).unwrap();
        assert!(classifier.predict(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_vocabulary_size_must_match() {
        let mut config = small_config();
        config.num_classes = 4;
        assert!(SequenceClassifier::new(config, vocabulary()).is_err());
    }

    #[test]
    fn test_dropout_forward_keeps_output_shape() {
        let classifier = SequenceClassifier::new(small_config(), vocabulary()).unwrap();
        let inputs = classifier
            .windows_tensor(&[window(5, 4, 0.0), window(5, 4, 1.0)])
            .unwrap();
        let logits = classifier
            .forward(&inputs, KeepProbability::new(0.5).unwrap())
            .unwrap();
        assert_eq!(logits.dims(), &[2, 3]);
    }

    #[test]
    fn test_feature_transform_must_match_training() {
        let classifier = SequenceClassifier::new(small_config(), vocabulary()).unwrap();
        assert!(classifier
            .check_feature_config(&small_config().features)
            .is_ok());

        let mut other = small_config().features;
        other.hop_length = 256;
        other.n_mels = 40;
        assert!(matches!(
            classifier.check_feature_config(&other),
            Err(ModelError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_debug_lists_config() {
        let classifier = SequenceClassifier::new(small_config(), vocabulary()).unwrap();
        let rendered = format!("{classifier:?}");
        assert!(rendered.contains("SequenceClassifier"));
        assert!(rendered.contains("hidden_size: 8"));
    }

    #[test]
    fn test_keep_probability_bounds() {
        assert!(KeepProbability::new(0.0).is_err());
        assert!(KeepProbability::new(1.5).is_err());
        assert!(!KeepProbability::ALL.is_dropout());
        assert!(KeepProbability::new(0.8).unwrap().is_dropout());
    }

    #[test]
    fn test_scaler_fit_standardizes_bands() {
        let windows = vec![
            FeatureWindow::from_rows(2, 2, vec![1.0, 10.0, 3.0, 10.0]).unwrap(),
            FeatureWindow::from_rows(2, 2, vec![1.0, 10.0, 3.0, 10.0]).unwrap(),
        ];
        let scaler = InputScaler::fit(&windows, 2);
        assert_eq!(scaler.mean, vec![2.0, 10.0]);
        assert_eq!(scaler.std_dev, vec![1.0, 1.0]);
    }

    #[test]
    fn test_argmax_ties_go_to_lower_index() {
        let batch = PredictionBatch::from_rows(vec![vec![0.4, 0.4, 0.2], vec![0.1, 0.2, 0.7]]);
        assert_eq!(batch.argmax(), vec![0, 2]);
    }
}
