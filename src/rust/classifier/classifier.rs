use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use log::debug;
use ndarray::{Array1, Array2, ArrayView2};

use super::error::ClassifierError;
use super::model::{ModelConfig, PartNumberNet};
use super::utils::argmax;
use super::vocabulary::Vocabulary;
use crate::dataset::PartClass;

/// Rows per forward pass when scoring many sequences at once.
const INFERENCE_BATCH: usize = 256;

/// Class probabilities for one input.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: PartClass,
    /// Softmax output, indexed by `PartClass::index`
    pub probabilities: Array1<f32>,
}

impl Prediction {
    fn from_probabilities(probabilities: Array1<f32>) -> Result<Self, ClassifierError> {
        let label = argmax(probabilities.view())
            .and_then(PartClass::from_index)
            .ok_or_else(|| ClassifierError::PredictionError("Model returned no class scores".into()))?;
        Ok(Self { label, probabilities })
    }

    pub fn score(&self, class: PartClass) -> f32 {
        self.probabilities[class.index()]
    }

    pub fn scores(&self) -> HashMap<PartClass, f32> {
        PartClass::ALL.iter().map(|&c| (c, self.score(c))).collect()
    }
}

/// A trained part-number classifier.
///
/// Holds everything inference depends on: the frozen vocabulary, the encoded
/// length `L` and the network weights. It is immutable once built and
/// `Send + Sync`, so it can be shared across threads behind an `Arc`:
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use partclass::{RuntimeConfig, SnapshotStore};
/// use std::sync::Arc;
/// use std::thread;
///
/// let store = SnapshotStore::new("artifacts")?;
/// let classifier = Arc::new(store.load(&RuntimeConfig::default())?);
///
/// let classifier_clone = Arc::clone(&classifier);
/// thread::spawn(move || {
///     classifier_clone.predict("296-8521-1-ND").unwrap();
/// });
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Classifier {
    vocabulary: Arc<Vocabulary>,
    config: ModelConfig,
    net: Arc<PartNumberNet>,
    varmap: VarMap,
    device: Device,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Classifier>();
    }
};

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("vocabulary_size", &self.vocabulary.len())
            .field("config", &self.config)
            .field("device", &self.device)
            .finish()
    }
}

impl Classifier {
    /// Creates a new ClassifierBuilder for fluent construction
    pub fn builder() -> super::builder::ClassifierBuilder {
        super::builder::ClassifierBuilder::new()
    }

    pub(crate) fn new(
        vocabulary: Vocabulary,
        config: ModelConfig,
        net: PartNumberNet,
        varmap: VarMap,
        device: Device,
    ) -> Self {
        Self {
            vocabulary: Arc::new(vocabulary),
            config,
            net: Arc::new(net),
            varmap,
            device,
        }
    }

    /// Rebuilds the network described by `config` and loads its weights.
    pub(crate) fn load(
        vocabulary: Vocabulary,
        config: ModelConfig,
        weights_path: &Path,
        device: Device,
    ) -> Result<Self, ClassifierError> {
        if vocabulary.input_size() != config.input_size {
            return Err(ClassifierError::ModelError(format!(
                "Vocabulary has {} codes but the model expects {}",
                vocabulary.input_size(),
                config.input_size
            )));
        }
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let net = PartNumberNet::new(&config, vb)?;
        varmap.load(weights_path)?;
        Ok(Self::new(vocabulary, config, net, varmap, device))
    }

    pub(crate) fn save_weights(&self, path: &Path) -> Result<(), ClassifierError> {
        self.varmap.save(path)?;
        Ok(())
    }

    /// Returns information about the classifier's current state
    pub fn info(&self) -> super::ClassifierInfo {
        super::ClassifierInfo {
            num_classes: self.config.num_classes,
            class_labels: PartClass::ALL.iter().map(|c| c.name().to_string()).collect(),
            vocabulary_size: self.vocabulary.len(),
            sequence_length: self.config.sequence_length,
            embedding_size: self.config.embedding_dim,
            hidden_size: self.config.hidden_size,
            parameter_count: self.config.parameter_count(),
        }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn sequence_length(&self) -> usize {
        self.config.sequence_length
    }

    /// Encodes `text` to the fixed length the network was trained on.
    ///
    /// # Errors
    /// - `ValidationError` if the text is empty
    /// - `UnknownSymbol` if the text contains a character outside the vocabulary
    pub fn encode(&self, text: &str) -> Result<Vec<u32>, ClassifierError> {
        if text.is_empty() {
            return Err(ClassifierError::ValidationError("Input text cannot be empty".into()));
        }
        let length = self.sequence_length();
        if text.chars().count() > length {
            debug!("Truncating {:?} to {} characters", text, length);
        }
        self.vocabulary.encode_padded(text, length)
    }

    /// Predicts the class of a part number or SKU.
    ///
    /// # Example
    /// ```no_run
    /// # use partclass::{RuntimeConfig, SnapshotStore};
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let classifier = SnapshotStore::new("artifacts")?.load(&RuntimeConfig::default())?;
    /// let prediction = classifier.predict("296-8521-1-ND")?;
    /// println!("Predicted class: {}", prediction.label);
    /// for (class, score) in prediction.scores() {
    ///     println!("{}: {:.2}", class, score);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn predict(&self, text: &str) -> Result<Prediction, ClassifierError> {
        let mut predictions = self.predict_batch(&[text])?;
        predictions
            .pop()
            .ok_or_else(|| ClassifierError::PredictionError("No prediction produced".into()))
    }

    pub fn predict_batch(&self, texts: &[&str]) -> Result<Vec<Prediction>, ClassifierError> {
        let length = self.sequence_length();
        let mut flat = Vec::with_capacity(texts.len() * length);
        for text in texts {
            flat.extend(self.encode(text)?);
        }
        let sequences = Array2::from_shape_vec((texts.len(), length), flat)
            .map_err(|e| ClassifierError::PredictionError(e.to_string()))?;

        self.predict_encoded(sequences.view())?
            .outer_iter()
            .map(|row| Prediction::from_probabilities(row.to_owned()))
            .collect()
    }

    /// Probabilities for already encoded sequences, one row per input.
    pub fn predict_encoded(&self, sequences: ArrayView2<'_, u32>) -> Result<Array2<f32>, ClassifierError> {
        let (rows, length) = sequences.dim();
        if length != self.sequence_length() {
            return Err(ClassifierError::ValidationError(format!(
                "Expected sequences of length {}, got {}",
                self.sequence_length(),
                length
            )));
        }

        let classes = self.config.num_classes;
        let mut out = Vec::with_capacity(rows * classes);
        let mut start = 0;
        while start < rows {
            let end = (start + INFERENCE_BATCH).min(rows);
            let chunk: Vec<u32> = sequences
                .slice(ndarray::s![start..end, ..])
                .iter()
                .copied()
                .collect();
            let ids = Tensor::from_vec(chunk, (end - start, length), &self.device)?;
            let probs = self.net.probabilities(&ids)?;
            out.extend(probs.flatten_all()?.to_vec1::<f32>()?);
            start = end;
        }

        Array2::from_shape_vec((rows, classes), out)
            .map_err(|e| ClassifierError::PredictionError(e.to_string()))
    }

    /// Class probabilities after each prefix of `text`.
    ///
    /// Row `i` holds the `i`-th character and the prediction for the unpadded
    /// prefix ending at it.
    pub fn explain(&self, text: &str) -> Result<Vec<(char, Array1<f32>)>, ClassifierError> {
        if text.is_empty() {
            return Err(ClassifierError::ValidationError("Input text cannot be empty".into()));
        }
        let codes = self.vocabulary.encode(text)?;
        let steps = codes.len();
        let ids = Tensor::from_vec(codes, (1, steps), &self.device)?;
        let logits = self.net.forward_steps(&ids)?;
        let probs = candle_nn::ops::softmax(&logits, D::Minus1)?
            .squeeze(0)?
            .to_vec2::<f32>()?;

        Ok(text
            .chars()
            .zip(probs)
            .map(|(c, row)| (c, Array1::from(row)))
            .collect())
    }
}
