// Dataset module - labeled window corpus and held-out split
//
// The builder decodes every source recording, extracts its feature
// windows and pairs each one with the recording's one-hot label. Recordings
// are processed on rayon workers but reassembled in input order, so the
// corpus (and therefore the seeded split) is identical across runs.

use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::features::{FeatureExtractor, FeatureWindow};
use crate::audio::AudioDecoder;
use crate::config::SourceRecording;
use crate::error::{log_audio_error, AudioError, ModelError};

/// Ordered class names; index `i` is position `i` of every one-hot vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassVocabulary {
    classes: Vec<String>,
}

impl ClassVocabulary {
    /// Build from labels in lexicographic order
    ///
    /// The order depends only on the set of labels, never on the order the
    /// recordings were listed in.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut classes: Vec<String> = labels.into_iter().map(Into::into).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(label)).ok()
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    /// One-hot vector for `label`, or `None` if the label is unknown
    pub fn one_hot(&self, label: &str) -> Option<Vec<f32>> {
        let index = self.index_of(label)?;
        let mut encoded = vec![0.0; self.classes.len()];
        encoded[index] = 1.0;
        Some(encoded)
    }
}

/// A feature window and its one-hot label, kept together
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledExample {
    pub window: FeatureWindow,
    pub one_hot: Vec<f32>,
}

impl LabeledExample {
    /// Index of the hot position
    pub fn class_index(&self) -> usize {
        self.one_hot
            .iter()
            .position(|&v| v == 1.0)
            .unwrap_or_default()
    }
}

/// Ordered collection of labeled windows
#[derive(Debug, Clone)]
pub struct Corpus {
    pub vocabulary: ClassVocabulary,
    pub examples: Vec<LabeledExample>,
}

/// Deterministic train/evaluation partition of a corpus
#[derive(Debug, Clone)]
pub struct CorpusSplit {
    pub vocabulary: ClassVocabulary,
    pub train: Vec<LabeledExample>,
    pub eval: Vec<LabeledExample>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Shuffle with a seeded RNG and hold out `ceil(n * eval_fraction)` examples
    ///
    /// Same corpus + same seed always gives the same partition.
    pub fn split(self, eval_fraction: f32, seed: u64) -> CorpusSplit {
        let n = self.examples.len();
        let eval_len = ((n as f32 * eval_fraction).ceil() as usize).min(n);

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));

        let mut slots: Vec<Option<LabeledExample>> = self.examples.into_iter().map(Some).collect();
        let mut take = |i: usize| slots[i].take();

        let eval: Vec<LabeledExample> = order[..eval_len].iter().filter_map(|&i| take(i)).collect();
        let train: Vec<LabeledExample> = order[eval_len..].iter().filter_map(|&i| take(i)).collect();

        log::info!(
            "Split corpus of {} windows into {} train / {} eval (seed {})",
            n,
            train.len(),
            eval.len(),
            seed
        );

        CorpusSplit {
            vocabulary: self.vocabulary,
            train,
            eval,
        }
    }
}

/// A recording the builder could not use
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecording {
    pub file: String,
    pub error: AudioError,
}

/// Output of a dataset build: the corpus plus per-recording bookkeeping
#[derive(Debug, Clone)]
pub struct DatasetReport {
    pub corpus: Corpus,
    /// Windows contributed by each input recording, in input order
    pub windows_per_recording: Vec<(String, usize)>,
    pub skipped: Vec<SkippedRecording>,
}

/// Assembles a labeled corpus from source recordings
pub struct DatasetBuilder<D: AudioDecoder> {
    extractor: FeatureExtractor,
    decoder: D,
}

impl<D: AudioDecoder> DatasetBuilder<D> {
    pub fn new(extractor: FeatureExtractor, decoder: D) -> Self {
        Self { extractor, decoder }
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Decode, extract and label every recording
    ///
    /// Unreadable or degenerate recordings are logged and reported in
    /// `DatasetReport::skipped`; the build continues without them.
    ///
    /// # Returns
    /// * `Err(ModelError::EmptyDataset)` - no recording produced a window
    pub fn build(
        &self,
        base_dir: &Path,
        recordings: &[SourceRecording],
    ) -> Result<DatasetReport, ModelError> {
        let vocabulary = ClassVocabulary::from_labels(recordings.iter().map(|r| r.label.clone()));
        log::info!(
            "Building dataset from {} recordings, classes {:?}",
            recordings.len(),
            vocabulary.classes()
        );

        // par_iter + collect keeps input order regardless of completion order.
        let outcomes: Vec<Result<Vec<FeatureWindow>, AudioError>> = recordings
            .par_iter()
            .map(|source| self.windows_for(&base_dir.join(&source.file)))
            .collect();

        let mut examples = Vec::new();
        let mut windows_per_recording = Vec::with_capacity(recordings.len());
        let mut skipped = Vec::new();

        for (source, outcome) in recordings.iter().zip(outcomes) {
            let file = source.file.display().to_string();
            match outcome {
                Ok(windows) => {
                    let one_hot = vocabulary
                        .one_hot(&source.label)
                        .unwrap_or_else(|| unreachable!("vocabulary built from these labels"));
                    log::debug!("{}: {} windows ({})", file, windows.len(), source.label);
                    windows_per_recording.push((file, windows.len()));
                    examples.extend(windows.into_iter().map(|window| LabeledExample {
                        window,
                        one_hot: one_hot.clone(),
                    }));
                }
                Err(error) => {
                    log_audio_error(&error, "DatasetBuilder::build");
                    log::warn!("Skipping {}", file);
                    windows_per_recording.push((file.clone(), 0));
                    skipped.push(SkippedRecording { file, error });
                }
            }
        }

        if examples.is_empty() {
            return Err(ModelError::EmptyDataset);
        }

        log::info!(
            "Dataset ready: {} windows from {} recordings ({} skipped)",
            examples.len(),
            recordings.len() - skipped.len(),
            skipped.len()
        );

        Ok(DatasetReport {
            corpus: Corpus {
                vocabulary,
                examples,
            },
            windows_per_recording,
            skipped,
        })
    }

    fn windows_for(&self, path: &Path) -> Result<Vec<FeatureWindow>, AudioError> {
        let recording = self.decoder.decode(path)?;
        Ok(self.extractor.extract(&recording)?.collect())
    }
}
