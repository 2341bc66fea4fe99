use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use motor_sound::analysis::features::FeatureExtractor;
use motor_sound::audio::{AudioDecoder, WavDecoder};
use motor_sound::config::{DataConfig, PipelineConfig};
use motor_sound::dataset::{DatasetBuilder, DatasetReport};
use motor_sound::error::ErrorCode;
use motor_sound::inference::{classify_recording, ClassifyError, RecordingVerdict};
use motor_sound::model::{checkpoint, ClassifierConfig, SequenceClassifier};
use motor_sound::testing::synthetic;
use motor_sound::training::Trainer;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "pipeline.json";

#[derive(Parser, Debug)]
#[command(
    name = "motor_cli",
    about = "Train and run the motor acoustic condition classifier"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write synthetic motor recordings and a pipeline.json describing them
    Synth {
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 10.0)]
        seconds: f32,
        #[arg(long, default_value_t = 22_050)]
        sample_rate: u32,
        #[arg(long, default_value_t = 2)]
        per_class: usize,
    },
    /// Extract feature windows and report counts per recording
    Extract {
        #[arg(long)]
        config: PathBuf,
    },
    /// Train a classifier and write a checkpoint
    Train {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        checkpoint: PathBuf,
        /// Override training.iterations
        #[arg(long)]
        iterations: Option<usize>,
    },
    /// Classify recordings with a trained checkpoint
    Classify {
        #[arg(long)]
        checkpoint: PathBuf,
        /// Feature settings and default test files
        #[arg(long)]
        config: Option<PathBuf>,
        files: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Ignore the error if a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Synth {
            output,
            seconds,
            sample_rate,
            per_class,
        } => run_synth(&output, seconds, sample_rate, per_class),
        Commands::Extract { config } => run_extract(&config),
        Commands::Train {
            config,
            checkpoint,
            iterations,
        } => run_train(&config, checkpoint, iterations),
        Commands::Classify {
            checkpoint,
            config,
            files,
        } => run_classify(&checkpoint, config.as_deref(), files),
    }
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    let config = PipelineConfig::load_from_file(path)?;
    config
        .validate()
        .with_context(|| format!("validating {}", path.display()))?;
    Ok(config)
}

fn build_dataset(config: &PipelineConfig) -> Result<DatasetReport> {
    let extractor = FeatureExtractor::new(config.features.clone())?;
    let builder = DatasetBuilder::new(extractor, WavDecoder);
    let report = builder
        .build(&config.data.base_dir, &config.data.recordings)
        .with_context(|| format!("building dataset from {}", config.data.base_dir.display()))?;
    Ok(report)
}

fn run_synth(output: &Path, seconds: f32, sample_rate: u32, per_class: usize) -> Result<ExitCode> {
    let recordings = synthetic::write_corpus(output, per_class, seconds, sample_rate)
        .with_context(|| format!("writing recordings to {}", output.display()))?;

    // One recording per condition doubles as the default classify set.
    let test_files = recordings
        .iter()
        .filter(|r| r.file.to_string_lossy().ends_with("_0.wav"))
        .map(|r| r.file.clone())
        .collect();

    let config = PipelineConfig {
        data: DataConfig {
            base_dir: PathBuf::from("."),
            recordings,
            test_files,
        },
        ..PipelineConfig::default()
    };
    let config_path = output.join(CONFIG_FILE);
    config.save_to_file(&config_path)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&SynthPayload {
            config: &config_path,
            recordings: config.data.recordings.len(),
            sample_rate,
            seconds,
        })?
    );
    Ok(ExitCode::from(0))
}

fn run_extract(config_path: &Path) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let report = build_dataset(&config)?;

    let payload = ExtractPayload {
        classes: report.corpus.vocabulary.classes(),
        total_windows: report.corpus.len(),
        recordings: report
            .windows_per_recording
            .iter()
            .map(|(file, windows)| RecordingWindows {
                file,
                windows: *windows,
            })
            .collect(),
        skipped: report
            .skipped
            .iter()
            .map(|s| SkippedPayload {
                file: &s.file,
                code: s.error.code(),
                message: s.error.message(),
            })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(ExitCode::from(0))
}

fn run_train(config_path: &Path, checkpoint_dir: PathBuf, iterations: Option<usize>) -> Result<ExitCode> {
    let mut config = load_config(config_path)?;
    if let Some(iterations) = iterations {
        config.training.iterations = iterations;
    }
    config.training.checkpoint = Some(checkpoint_dir);

    let report = build_dataset(&config)?;
    let split = report
        .corpus
        .split(config.training.eval_fraction, config.training.random_seed);

    let classifier_config =
        ClassifierConfig::new(&config.features, &config.model, split.vocabulary.len());
    let mut classifier = SequenceClassifier::new(classifier_config, split.vocabulary.clone())?;
    let trainer = Trainer::new(config.training.clone())?;
    let training = trainer
        .train(&mut classifier, &split)
        .context("training classifier")?;

    println!("{}", serde_json::to_string_pretty(&training)?);
    Ok(ExitCode::from(0))
}

fn run_classify(
    checkpoint_dir: &Path,
    config_path: Option<&Path>,
    files: Vec<PathBuf>,
) -> Result<ExitCode> {
    let config = config_path.map(load_config).transpose()?;
    let files: Vec<PathBuf> = match (&config, files.is_empty()) {
        (Some(config), true) => config
            .data
            .test_files
            .iter()
            .map(|f| config.data.base_dir.join(f))
            .collect(),
        _ => files,
    };
    if files.is_empty() {
        bail!("no files to classify: pass recordings or set data.test_files in --config");
    }

    let classifier = checkpoint::load(checkpoint_dir)
        .with_context(|| format!("loading checkpoint {}", checkpoint_dir.display()))?;
    // Windows must come from the transform the checkpoint was trained with.
    if let Some(config) = &config {
        classifier
            .check_feature_config(&config.features)
            .with_context(|| format!("--config features do not match {}", checkpoint_dir.display()))?;
    }
    let extractor = FeatureExtractor::new(classifier.config().features.clone())?;

    let mut failed = false;
    for file in &files {
        match classify_file(&extractor, &classifier, file) {
            Ok(verdict) => {
                let payload = VerdictPayload {
                    file: file.display().to_string(),
                    verdict,
                };
                println!("{}", serde_json::to_string(&payload)?);
            }
            Err(err) => {
                failed = true;
                eprintln!("{}: {}", file.display(), err);
            }
        }
    }

    Ok(if failed {
        ExitCode::from(1)
    } else {
        ExitCode::from(0)
    })
}

fn classify_file(
    extractor: &FeatureExtractor,
    classifier: &SequenceClassifier,
    file: &Path,
) -> Result<RecordingVerdict, ClassifyError> {
    let recording = WavDecoder.decode(file)?;
    classify_recording(extractor, classifier, &recording)
}

#[derive(Serialize)]
struct SynthPayload<'a> {
    config: &'a Path,
    recordings: usize,
    sample_rate: u32,
    seconds: f32,
}

#[derive(Serialize)]
struct ExtractPayload<'a> {
    classes: &'a [String],
    total_windows: usize,
    recordings: Vec<RecordingWindows<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    skipped: Vec<SkippedPayload<'a>>,
}

#[derive(Serialize)]
struct RecordingWindows<'a> {
    file: &'a str,
    windows: usize,
}

#[derive(Serialize)]
struct SkippedPayload<'a> {
    file: &'a str,
    code: i32,
    message: String,
}

#[derive(Serialize)]
struct VerdictPayload {
    file: String,
    #[serde(flatten)]
    verdict: RecordingVerdict,
}
