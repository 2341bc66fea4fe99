// Checkpoint - safetensors weights plus a JSON manifest
//
// A checkpoint is a directory holding `model.safetensors` (all trainable
// parameters) and `manifest.json` (classifier shape including the feature
// settings, class vocabulary, input scaler). Loading rebuilds the classifier
// from the manifest and then overwrites its freshly initialized parameters
// with the stored ones.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ClassifierConfig, InputScaler, SequenceClassifier};
use crate::dataset::ClassVocabulary;
use crate::error::ModelError;

pub const WEIGHTS_FILE: &str = "model.safetensors";
pub const MANIFEST_FILE: &str = "manifest.json";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointManifest {
    format_version: u32,
    config: ClassifierConfig,
    vocabulary: ClassVocabulary,
    scaler: Option<InputScaler>,
}

fn io_error(path: &Path, reason: impl ToString) -> ModelError {
    ModelError::CheckpointIo {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Write the classifier's parameters and manifest into `dir`
///
/// The directory is created if needed; existing files are overwritten.
pub fn save(classifier: &SequenceClassifier, dir: &Path) -> Result<(), ModelError> {
    fs::create_dir_all(dir).map_err(|err| io_error(dir, err))?;

    let weights_path = dir.join(WEIGHTS_FILE);
    classifier
        .varmap()
        .save(&weights_path)
        .map_err(|err| io_error(&weights_path, err))?;

    let manifest = CheckpointManifest {
        format_version: FORMAT_VERSION,
        config: classifier.config().clone(),
        vocabulary: classifier.vocabulary().clone(),
        scaler: classifier.scaler().cloned(),
    };
    let manifest_path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(&manifest).map_err(|err| io_error(&manifest_path, err))?;
    fs::write(&manifest_path, json).map_err(|err| io_error(&manifest_path, err))?;

    log::info!("Saved checkpoint to {}", dir.display());
    Ok(())
}

/// Restore a classifier previously written by [`save`]
pub fn load(dir: &Path) -> Result<SequenceClassifier, ModelError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let json = fs::read_to_string(&manifest_path).map_err(|err| io_error(&manifest_path, err))?;
    let manifest: CheckpointManifest =
        serde_json::from_str(&json).map_err(|err| io_error(&manifest_path, err))?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(io_error(
            &manifest_path,
            format!("unsupported format version {}", manifest.format_version),
        ));
    }

    let mut classifier = SequenceClassifier::new(manifest.config, manifest.vocabulary)?;

    let weights_path = dir.join(WEIGHTS_FILE);
    if !weights_path.is_file() {
        return Err(io_error(&weights_path, "weights file not found"));
    }
    classifier
        .varmap_mut()
        .load(&weights_path)
        .map_err(|err| io_error(&weights_path, err))?;

    if let Some(scaler) = manifest.scaler {
        classifier.set_scaler(scaler)?;
    }

    log::info!("Loaded checkpoint from {}", dir.display());
    Ok(classifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::features::FeatureWindow;
    use crate::config::FeatureConfig;

    fn classifier() -> SequenceClassifier {
        let config = ClassifierConfig {
            features: FeatureConfig {
                frames: 4,
                bands: 3,
                hop_length: 256,
                n_fft: 512,
                n_mels: 40,
            },
            hidden_size: 6,
            num_layers: 2,
            num_classes: 3,
            standardize_inputs: true,
        };
        let mut classifier =
            SequenceClassifier::new(config, ClassVocabulary::from_labels(["new", "red", "used"]))
                .unwrap();
        classifier
            .set_scaler(InputScaler {
                mean: vec![1.0, -2.0, 0.5],
                std_dev: vec![2.0, 1.0, 0.25],
            })
            .unwrap();
        classifier
    }

    fn windows() -> Vec<FeatureWindow> {
        (0..3)
            .map(|k| {
                let values = (0..12).map(|i| ((i * (k + 1)) as f32 * 0.3).cos()).collect();
                FeatureWindow::from_rows(4, 3, values).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_roundtrip_reproduces_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let original = classifier();
        save(&original, dir.path()).unwrap();

        assert!(dir.path().join(WEIGHTS_FILE).is_file());
        assert!(dir.path().join(MANIFEST_FILE).is_file());

        let restored = load(dir.path()).unwrap();
        assert_eq!(restored.config(), original.config());
        assert_eq!(restored.config().features.hop_length, 256);
        assert_eq!(restored.config().features.n_mels, 40);
        assert_eq!(restored.vocabulary(), original.vocabulary());
        assert_eq!(restored.scaler(), original.scaler());
        assert_eq!(
            restored.predict(&windows()).unwrap(),
            original.predict(&windows()).unwrap()
        );
    }

    #[test]
    fn test_missing_directory_is_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load(&dir.path().join("nope")),
            Err(ModelError::CheckpointIo { .. })
        ));
    }

    #[test]
    fn test_missing_weights_is_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        save(&classifier(), dir.path()).unwrap();
        fs::remove_file(dir.path().join(WEIGHTS_FILE)).unwrap();
        assert!(matches!(
            load(dir.path()),
            Err(ModelError::CheckpointIo { .. })
        ));
    }

    #[test]
    fn test_corrupt_manifest_is_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        save(&classifier(), dir.path()).unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "{ not json").unwrap();
        assert!(matches!(
            load(dir.path()),
            Err(ModelError::CheckpointIo { .. })
        ));
    }
}
