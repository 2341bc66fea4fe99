// Inference aggregator - one verdict per recording
//
// Every window of a recording votes for its argmax class. The verdict is
// the most voted class (ties go to the lowest class index) and its
// confidence is the share of windows that agree with it. Mean class
// probabilities are reported alongside for diagnostics.

use serde::Serialize;
use thiserror::Error;

use crate::analysis::features::{FeatureExtractor, FeatureWindow};
use crate::audio::RawRecording;
use crate::dataset::ClassVocabulary;
use crate::error::{AudioError, ModelError};
use crate::model::{PredictionBatch, SequenceClassifier};

/// Condition verdict for a single recording
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingVerdict {
    pub class_index: usize,
    pub label: String,
    /// Fraction of windows whose argmax equals `class_index`
    pub confidence: f32,
    /// Window votes per class, in vocabulary order
    pub votes: Vec<usize>,
    pub mean_probabilities: Vec<f32>,
    pub window_count: usize,
}

/// Majority vote over per-window predictions
///
/// # Returns
/// * `Err(ModelError::EmptyPrediction)` - the batch has no windows
/// * `Err(ModelError::InvalidConfig)` - row width differs from the vocabulary
pub fn aggregate(
    predictions: &PredictionBatch,
    vocabulary: &ClassVocabulary,
) -> Result<RecordingVerdict, ModelError> {
    if predictions.is_empty() {
        return Err(ModelError::EmptyPrediction);
    }
    let classes = vocabulary.len();
    if let Some(row) = predictions.rows().iter().find(|row| row.len() != classes) {
        return Err(ModelError::invalid_config(format!(
            "prediction row has {} classes, vocabulary has {}",
            row.len(),
            classes
        )));
    }

    let mut votes = vec![0usize; classes];
    for class in predictions.argmax() {
        votes[class] += 1;
    }

    // Strictly greater keeps the first (lowest) index on ties.
    let (class_index, agreeing) = votes
        .iter()
        .enumerate()
        .fold((0, 0), |best, (i, &n)| if n > best.1 { (i, n) } else { best });

    let window_count = predictions.len();
    let mut mean_probabilities = vec![0.0f32; classes];
    for row in predictions.rows() {
        for (sum, &p) in mean_probabilities.iter_mut().zip(row) {
            *sum += p;
        }
    }
    for sum in &mut mean_probabilities {
        *sum /= window_count as f32;
    }

    let label = vocabulary
        .label(class_index)
        .map(str::to_string)
        .ok_or_else(|| ModelError::invalid_config("empty vocabulary"))?;

    Ok(RecordingVerdict {
        class_index,
        label,
        confidence: agreeing as f32 / window_count as f32,
        votes,
        mean_probabilities,
        window_count,
    })
}

/// Failure while classifying a single recording
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Extract, predict and aggregate one recording
///
/// A recording too short to yield any window reports `EmptyPrediction`.
///
/// # Returns
/// * `Err(ClassifyError::Model(ModelError::InvalidConfig))` - the extractor's
///   feature settings differ from the ones the classifier was trained on
pub fn classify_recording(
    extractor: &FeatureExtractor,
    classifier: &SequenceClassifier,
    recording: &RawRecording,
) -> Result<RecordingVerdict, ClassifyError> {
    classifier.check_feature_config(extractor.config())?;
    let windows: Vec<FeatureWindow> = extractor.extract(recording)?.collect();
    let predictions = classifier.predict(&windows)?;
    let verdict = aggregate(&predictions, classifier.vocabulary())?;
    log::info!(
        "Classified {:.1} s recording as {} ({:.2} of {} windows)",
        recording.duration_secs(),
        verdict.label,
        verdict.confidence,
        verdict.window_count
    );
    Ok(verdict)
}
