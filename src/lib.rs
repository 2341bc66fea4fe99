// Motor Sound - acoustic condition classifier for electric motors
// MFCC feature windows fed to a stacked LSTM, one verdict per recording

// Module declarations
pub mod analysis;
pub mod audio;
pub mod config;
pub mod dataset;
pub mod error;
pub mod inference;
pub mod model;
pub mod testing;
pub mod training;

// Re-exports for convenience
pub use analysis::features::{FeatureExtractor, FeatureWindow};
pub use audio::{AudioDecoder, RawRecording, WavDecoder};
pub use config::PipelineConfig;
pub use dataset::{ClassVocabulary, Corpus, CorpusSplit, DatasetBuilder, LabeledExample};
pub use error::{AudioError, ErrorCode, ModelError};
pub use inference::{aggregate, classify_recording, ClassifyError, RecordingVerdict};
pub use model::{ClassifierConfig, PredictionBatch, SequenceClassifier};
pub use training::{Trainer, TrainingReport};
