// Trainer - mini-batch Adam optimization of the sequence classifier
//
// Loop per iteration:
// 1. Take the next `batch_size` indices from the BatchCycle
// 2. Forward with dropout, summed softmax cross-entropy against one-hot labels
// 3. Adam step on every classifier parameter
// 4. Every `display_step` iterations, score the same batch without dropout,
//    log it and hand it to the observer (which may stop training early)
//
// After the loop the held-out split is scored once and, when configured,
// a checkpoint is written.

mod batches;

pub use batches::BatchCycle;

use std::ops::ControlFlow;
use std::path::PathBuf;

use candle_core::{DType, Tensor, D};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use serde::Serialize;

use crate::config::TrainingConfig;
use crate::dataset::{CorpusSplit, LabeledExample};
use crate::error::ModelError;
use crate::model::{checkpoint, InputScaler, KeepProbability, SequenceClassifier};

/// Examples scored per forward pass during evaluation
const EVAL_CHUNK: usize = 256;

/// Mini-batch metrics at a reporting iteration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingProgress {
    pub iteration: usize,
    pub epoch: usize,
    pub batch_loss: f32,
    pub batch_accuracy: f32,
}

/// Loss and accuracy over a set of examples
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationMetrics {
    pub examples: usize,
    /// Mean cross-entropy per example
    pub mean_loss: f32,
    pub accuracy: f32,
}

/// Summary of a training run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub iterations_run: usize,
    pub stopped_early: bool,
    pub train_examples: usize,
    pub history: Vec<TrainingProgress>,
    pub evaluation: EvaluationMetrics,
    pub checkpoint: Option<PathBuf>,
}

/// Summed softmax cross-entropy: `-Σ labels · log_softmax(logits)`
pub fn cross_entropy(logits: &Tensor, labels: &Tensor) -> candle_core::Result<Tensor> {
    let log_probs = candle_nn::ops::log_softmax(logits, D::Minus1)?;
    (labels * &log_probs)?.sum_all()?.neg()
}

/// Number of rows whose argmax agrees with the one-hot label
fn correct_count(logits: &Tensor, labels: &Tensor) -> candle_core::Result<f32> {
    logits
        .argmax(D::Minus1)?
        .eq(&labels.argmax(D::Minus1)?)?
        .to_dtype(DType::F32)?
        .sum_all()?
        .to_scalar::<f32>()
}

fn labels_tensor(
    classifier: &SequenceClassifier,
    examples: &[&LabeledExample],
) -> Result<Tensor, ModelError> {
    let classes = classifier.config().num_classes;
    let mut data = Vec::with_capacity(examples.len() * classes);
    for example in examples {
        if example.one_hot.len() != classes {
            return Err(ModelError::invalid_config(format!(
                "label has {} classes, model expects {}",
                example.one_hot.len(),
                classes
            )));
        }
        data.extend_from_slice(&example.one_hot);
    }
    Ok(Tensor::from_vec(
        data,
        (examples.len(), classes),
        classifier.device(),
    )?)
}

fn batch_tensors(
    classifier: &SequenceClassifier,
    examples: &[&LabeledExample],
) -> Result<(Tensor, Tensor), ModelError> {
    let inputs = classifier.windows_tensor(examples.iter().map(|e| &e.window))?;
    let labels = labels_tensor(classifier, examples)?;
    Ok((inputs, labels))
}

pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    /// # Returns
    /// * `Err(ModelError::InvalidConfig)` - hyperparameters out of range
    pub fn new(config: TrainingConfig) -> Result<Self, ModelError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train for the configured number of iterations
    pub fn train(
        &self,
        classifier: &mut SequenceClassifier,
        split: &CorpusSplit,
    ) -> Result<TrainingReport, ModelError> {
        self.train_with_observer(classifier, split, |_| ControlFlow::Continue(()))
    }

    /// Train, calling `observer` at every reporting iteration
    ///
    /// Returning `ControlFlow::Break` from the observer ends the loop; the
    /// held-out evaluation and checkpoint still run.
    ///
    /// # Returns
    /// * `Err(ModelError::EmptyDataset)` - the training split is empty
    /// * `Err(ModelError::NonFiniteLoss)` - loss diverged; parameters are left
    ///   as they were after the last finite step
    pub fn train_with_observer<F>(
        &self,
        classifier: &mut SequenceClassifier,
        split: &CorpusSplit,
        mut observer: F,
    ) -> Result<TrainingReport, ModelError>
    where
        F: FnMut(&TrainingProgress) -> ControlFlow<()>,
    {
        let cfg = &self.config;
        if split.train.is_empty() {
            return Err(ModelError::EmptyDataset);
        }
        if &split.vocabulary != classifier.vocabulary() {
            return Err(ModelError::invalid_config(format!(
                "split classes {:?} differ from model classes {:?}",
                split.vocabulary.classes(),
                classifier.vocabulary().classes()
            )));
        }

        let span = tracing::info_span!(
            "train",
            iterations = cfg.iterations,
            batch_size = cfg.batch_size,
            train = split.train.len(),
            eval = split.eval.len()
        );
        let _guard = span.enter();

        if classifier.config().standardize_inputs {
            let scaler = InputScaler::fit(
                split.train.iter().map(|e| &e.window),
                classifier.config().bands(),
            );
            classifier.set_scaler(scaler)?;
        }

        let keep = KeepProbability::new(cfg.keep_probability)?;
        let mut batches = BatchCycle::new(split.train.len(), cfg.batch_size);
        if cfg.shuffle_each_epoch {
            batches = batches.with_epoch_shuffle(cfg.random_seed);
        }
        let mut optimizer = AdamW::new(
            classifier.varmap().all_vars(),
            ParamsAdamW {
                lr: cfg.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        tracing::info!(
            "[Trainer] Starting: {} iterations, batch {}, lr {}, keep {}",
            cfg.iterations,
            cfg.batch_size,
            cfg.learning_rate,
            keep.value()
        );

        let mut history = Vec::new();
        let mut iterations_run = 0;
        let mut stopped_early = false;

        for iteration in 1..=cfg.iterations {
            let indices = batches.next().ok_or(ModelError::EmptyDataset)?;
            let batch: Vec<&LabeledExample> = indices.iter().map(|&i| &split.train[i]).collect();
            let (inputs, labels) = batch_tensors(classifier, &batch)?;

            let logits = classifier.forward(&inputs, keep)?;
            let loss = cross_entropy(&logits, &labels)?;
            let loss_value = loss.to_scalar::<f32>()?;
            if !loss_value.is_finite() {
                tracing::error!(
                    "[Trainer] Loss became {} at iteration {}",
                    loss_value,
                    iteration
                );
                return Err(ModelError::NonFiniteLoss {
                    iteration,
                    loss: loss_value,
                });
            }
            optimizer.backward_step(&loss)?;
            iterations_run = iteration;

            if iteration % cfg.display_step == 0 || iteration == cfg.iterations {
                let logits = classifier.forward(&inputs, KeepProbability::ALL)?;
                let batch_loss = cross_entropy(&logits, &labels)?.to_scalar::<f32>()?;
                let batch_accuracy = correct_count(&logits, &labels)? / batch.len() as f32;
                let progress = TrainingProgress {
                    iteration,
                    epoch: batches.epoch(),
                    batch_loss,
                    batch_accuracy,
                };
                tracing::info!(
                    "[Trainer] Iter {}, Minibatch Loss= {:.6}, Training Accuracy= {:.5}",
                    iteration,
                    batch_loss,
                    batch_accuracy
                );
                let flow = observer(&progress);
                history.push(progress);
                if flow.is_break() {
                    tracing::info!("[Trainer] Stopped by observer at iteration {}", iteration);
                    stopped_early = true;
                    break;
                }
            }
        }

        let evaluation = Self::evaluate(classifier, &split.eval)?;
        tracing::info!(
            "[Trainer] Optimization finished: held-out accuracy {:.5} over {} windows",
            evaluation.accuracy,
            evaluation.examples
        );

        if let Some(dir) = &cfg.checkpoint {
            checkpoint::save(classifier, dir)?;
        }

        Ok(TrainingReport {
            iterations_run,
            stopped_early,
            train_examples: split.train.len(),
            history,
            evaluation,
            checkpoint: cfg.checkpoint.clone(),
        })
    }

    /// Score `examples` without dropout
    ///
    /// An empty set reports zero examples, zero loss and zero accuracy.
    pub fn evaluate(
        classifier: &SequenceClassifier,
        examples: &[LabeledExample],
    ) -> Result<EvaluationMetrics, ModelError> {
        let mut total_loss = 0.0f64;
        let mut correct = 0.0f64;

        for chunk in examples.chunks(EVAL_CHUNK) {
            let refs: Vec<&LabeledExample> = chunk.iter().collect();
            let (inputs, labels) = batch_tensors(classifier, &refs)?;
            let logits = classifier.forward(&inputs, KeepProbability::ALL)?;
            total_loss += cross_entropy(&logits, &labels)?.to_scalar::<f32>()? as f64;
            correct += correct_count(&logits, &labels)? as f64;
        }

        if examples.is_empty() {
            return Ok(EvaluationMetrics {
                examples: 0,
                mean_loss: 0.0,
                accuracy: 0.0,
            });
        }

        let n = examples.len() as f64;
        Ok(EvaluationMetrics {
            examples: examples.len(),
            mean_loss: (total_loss / n) as f32,
            accuracy: (correct / n) as f32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::features::FeatureWindow;
    use crate::dataset::ClassVocabulary;
    use crate::config::FeatureConfig;
    use crate::model::ClassifierConfig;

    const FRAMES: usize = 6;
    const BANDS: usize = 3;

    /// Two classes separable by the sign of the first band
    fn toy_split(per_class: usize) -> CorpusSplit {
        let vocabulary = ClassVocabulary::from_labels(["new", "red"]);
        let make = |class: usize, k: usize| {
            let sign = if class == 0 { 1.0 } else { -1.0 };
            let values = (0..FRAMES * BANDS)
                .map(|i| {
                    if i % BANDS == 0 {
                        sign * (2.0 + 0.1 * k as f32)
                    } else {
                        ((i + k) as f32 * 0.7).sin()
                    }
                })
                .collect();
            let mut one_hot = vec![0.0; 2];
            one_hot[class] = 1.0;
            LabeledExample {
                window: FeatureWindow::from_rows(FRAMES, BANDS, values).unwrap(),
                one_hot,
            }
        };
        let examples: Vec<_> = (0..per_class)
            .flat_map(|k| [make(0, k), make(1, k)])
            .collect();
        let eval = examples[..4].to_vec();
        let train = examples[4..].to_vec();
        CorpusSplit {
            vocabulary,
            train,
            eval,
        }
    }

    fn toy_classifier(standardize: bool) -> SequenceClassifier {
        SequenceClassifier::new(
            ClassifierConfig {
                features: FeatureConfig {
                    frames: FRAMES,
                    bands: BANDS,
                    ..FeatureConfig::default()
                },
                hidden_size: 8,
                num_layers: 2,
                num_classes: 2,
                standardize_inputs: standardize,
            },
            ClassVocabulary::from_labels(["new", "red"]),
        )
        .unwrap()
    }

    fn toy_config(iterations: usize) -> TrainingConfig {
        TrainingConfig {
            learning_rate: 0.02,
            batch_size: 8,
            iterations,
            display_step: 10,
            keep_probability: 1.0,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_cross_entropy_of_confident_correct_prediction_is_small() {
        let device = candle_core::Device::Cpu;
        let logits = Tensor::new(&[[10.0f32, -10.0], [-10.0, 10.0]], &device).unwrap();
        let labels = Tensor::new(&[[1.0f32, 0.0], [0.0, 1.0]], &device).unwrap();
        let loss = cross_entropy(&logits, &labels)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(loss < 1e-3, "loss {loss}");

        let uniform = Tensor::zeros((2, 2), DType::F32, &device).unwrap();
        let loss = cross_entropy(&uniform, &labels)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        approx::assert_relative_eq!(loss, 2.0 * std::f32::consts::LN_2, epsilon = 1e-5);
    }

    #[test]
    fn test_training_learns_separable_classes() {
        let split = toy_split(20);
        let mut classifier = toy_classifier(true);
        let trainer = Trainer::new(toy_config(120)).unwrap();

        let report = trainer.train(&mut classifier, &split).unwrap();

        assert_eq!(report.iterations_run, 120);
        assert!(!report.stopped_early);
        assert_eq!(report.history.len(), 12);
        assert_eq!(report.evaluation.examples, 4);
        assert!(
            report.evaluation.accuracy >= 0.75,
            "held-out accuracy {}",
            report.evaluation.accuracy
        );
        let first = report.history.first().unwrap().batch_loss;
        let last = report.history.last().unwrap().batch_loss;
        assert!(last < first, "loss {first} -> {last}");
        assert!(classifier.scaler().is_some());
    }

    #[test]
    fn test_observer_can_stop_training() {
        let split = toy_split(6);
        let mut classifier = toy_classifier(false);
        let trainer = Trainer::new(toy_config(100)).unwrap();

        let mut seen = Vec::new();
        let report = trainer
            .train_with_observer(&mut classifier, &split, |progress| {
                seen.push(progress.iteration);
                if progress.iteration >= 20 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();

        assert_eq!(seen, vec![10, 20]);
        assert!(report.stopped_early);
        assert_eq!(report.iterations_run, 20);
        assert!(classifier.scaler().is_none());
    }

    #[test]
    fn test_empty_training_split_is_rejected() {
        let mut split = toy_split(4);
        split.train.clear();
        let trainer = Trainer::new(toy_config(5)).unwrap();
        assert!(matches!(
            trainer.train(&mut toy_classifier(false), &split),
            Err(ModelError::EmptyDataset)
        ));
    }

    #[test]
    fn test_vocabulary_mismatch_is_rejected() {
        let mut split = toy_split(4);
        split.vocabulary = ClassVocabulary::from_labels(["new", "used"]);
        let trainer = Trainer::new(toy_config(5)).unwrap();
        assert!(matches!(
            trainer.train(&mut toy_classifier(false), &split),
            Err(ModelError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_diverging_inputs_report_non_finite_loss() {
        let mut split = toy_split(4);
        for example in &mut split.train {
            let values = vec![f32::NAN; FRAMES * BANDS];
            example.window = FeatureWindow::from_rows(FRAMES, BANDS, values).unwrap();
        }
        let trainer = Trainer::new(toy_config(5)).unwrap();
        let err = trainer
            .train(&mut toy_classifier(false), &split)
            .unwrap_err();
        assert!(matches!(err, ModelError::NonFiniteLoss { iteration: 1, .. }));
    }

    #[test]
    fn test_checkpoint_written_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let split = toy_split(4);
        let mut config = toy_config(3);
        config.checkpoint = Some(dir.path().join("ckpt"));
        let trainer = Trainer::new(config).unwrap();

        let report = trainer.train(&mut toy_classifier(true), &split).unwrap();
        let saved = report.checkpoint.unwrap();
        assert!(saved.join(checkpoint::MANIFEST_FILE).is_file());
        assert!(saved.join(checkpoint::WEIGHTS_FILE).is_file());
    }

    #[test]
    fn test_evaluate_empty_set() {
        let metrics = Trainer::evaluate(&toy_classifier(false), &[]).unwrap();
        assert_eq!(metrics.examples, 0);
        assert_eq!(metrics.accuracy, 0.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = toy_config(5);
        config.batch_size = 0;
        assert!(Trainer::new(config).is_err());
    }
}
