use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::classifier::{Classifier, ClassifierError, LayerDescription, ModelConfig, Vocabulary};
use crate::encoding::ProcessedDataset;
use crate::runtime::{create_device, RuntimeConfig};

const ARCHITECTURE_FILE: &str = "model.json";
const WEIGHTS_FILE: &str = "weights.safetensors";
const VOCABULARY_FILE: &str = "vocabulary.json";
const DATASET_FILE: &str = "dataset.json";
const MANIFEST_FILE: &str = "manifest.json";

/// Bumped when the layout of the snapshot files changes.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Snapshot file missing: {0}")]
    Missing(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported snapshot format version {0}")]
    UnsupportedVersion(u32),
    #[error("Hash mismatch: expected {expected}, got {actual} for {file}")]
    HashMismatch {
        file: String,
        expected: String,
        actual: String,
    },
    #[error("Model error: {0}")]
    Model(#[from] ClassifierError),
}

/// Contents of `model.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArchitecture {
    pub format_version: u32,
    pub model: ModelConfig,
    pub layers: Vec<LayerDescription>,
}

/// Contents of `manifest.json`: SHA-256 of every other snapshot file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub files: BTreeMap<String, String>,
}

/// A directory holding one trained model and everything needed to reuse it.
///
/// The architecture, weights, vocabulary and processed dataset are always
/// written and read together.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Opens an existing snapshot directory without creating anything.
    ///
    /// # Errors
    /// - `Missing` if `dir` is not a directory
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, SnapshotError> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(SnapshotError::Missing(dir));
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn architecture_path(&self) -> PathBuf {
        self.dir.join(ARCHITECTURE_FILE)
    }

    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(WEIGHTS_FILE)
    }

    pub fn vocabulary_path(&self) -> PathBuf {
        self.dir.join(VOCABULARY_FILE)
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.dir.join(DATASET_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    fn artifact_paths(&self) -> [PathBuf; 4] {
        [
            self.architecture_path(),
            self.weights_path(),
            self.vocabulary_path(),
            self.dataset_path(),
        ]
    }

    pub fn exists(&self) -> bool {
        let manifest = self.manifest_path();
        log::debug!("Checking snapshot at {:?}", self.dir);
        manifest.exists() && self.artifact_paths().iter().all(|p| p.exists())
    }

    /// Writes all artifacts, then the manifest of their hashes.
    pub fn write(&self, classifier: &Classifier, dataset: &ProcessedDataset) -> Result<(), SnapshotError> {
        log::info!("Writing snapshot to {:?}", self.dir);
        fs::create_dir_all(&self.dir)?;

        if dataset.sequence_length != classifier.sequence_length() {
            return Err(ClassifierError::ValidationError(format!(
                "Dataset sequence length {} does not match model sequence length {}",
                dataset.sequence_length,
                classifier.sequence_length()
            ))
            .into());
        }

        let architecture = ModelArchitecture {
            format_version: FORMAT_VERSION,
            model: classifier.model_config().clone(),
            layers: classifier.model_config().layers(),
        };
        write_json(&self.architecture_path(), &architecture)?;
        classifier.save_weights(&self.weights_path())?;
        write_json(&self.vocabulary_path(), classifier.vocabulary())?;
        write_json(&self.dataset_path(), dataset)?;

        let mut manifest = Manifest {
            format_version: FORMAT_VERSION,
            files: BTreeMap::new(),
        };
        for path in self.artifact_paths() {
            let hash = hash_file(&path)?;
            log::debug!("{:?}: {}", path, hash);
            manifest.files.insert(file_name(&path), hash);
        }
        write_json(&self.manifest_path(), &manifest)?;

        log::info!("Snapshot written ({} artifacts)", manifest.files.len());
        Ok(())
    }

    /// Checks every artifact against the manifest.
    ///
    /// Returns `Ok(false)` when files are missing or a hash differs.
    pub fn verify(&self) -> Result<bool, SnapshotError> {
        if !self.exists() {
            log::info!("Snapshot at {:?} is incomplete", self.dir);
            return Ok(false);
        }
        match self.check_hashes() {
            Ok(()) => Ok(true),
            Err(SnapshotError::HashMismatch { file, .. }) => {
                log::warn!("Snapshot file {} does not match the manifest", file);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn check_hashes(&self) -> Result<(), SnapshotError> {
        let manifest: Manifest = self.read_json(&self.manifest_path())?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(manifest.format_version));
        }
        for path in self.artifact_paths() {
            let name = file_name(&path);
            let expected = manifest
                .files
                .get(&name)
                .ok_or_else(|| SnapshotError::Missing(path.clone()))?;
            let actual = hash_file(&path)?;
            if &actual != expected {
                return Err(SnapshotError::HashMismatch {
                    file: name,
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Loads the classifier: architecture, vocabulary and weights together.
    pub fn load(&self, runtime: &RuntimeConfig) -> Result<Classifier, SnapshotError> {
        log::info!("Loading snapshot from {:?}", self.dir);
        self.check_hashes()?;

        let architecture: ModelArchitecture = self.read_json(&self.architecture_path())?;
        if architecture.format_version != FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(architecture.format_version));
        }
        let vocabulary: Vocabulary = self.read_json(&self.vocabulary_path())?;
        let device = create_device(runtime);
        let classifier = Classifier::load(vocabulary, architecture.model, &self.weights_path(), device)?;

        log::info!(
            "Loaded classifier ({} symbols, sequence length {})",
            classifier.vocabulary().len(),
            classifier.sequence_length()
        );
        Ok(classifier)
    }

    /// Loads the processed dataset written next to the model.
    pub fn load_dataset(&self) -> Result<ProcessedDataset, SnapshotError> {
        self.check_hashes()?;
        self.read_json(&self.dataset_path())
    }

    pub fn remove(&self) -> Result<(), SnapshotError> {
        for path in self.artifact_paths().iter().chain(Some(&self.manifest_path())) {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T, SnapshotError> {
        if !path.exists() {
            return Err(SnapshotError::Missing(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SnapshotError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes)?;
    Ok(())
}

fn hash_file(path: &Path) -> Result<String, SnapshotError> {
    if !path.exists() {
        return Err(SnapshotError::Missing(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
