use candle_core::{DType, Device, Tensor, D};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::classifier::Classifier;
use super::error::ClassifierError;
use super::model::{init_weights, ModelConfig, PartNumberNet};
use super::utils::argmax;
use super::vocabulary::Vocabulary;
use crate::config::TrainingConfig;
use crate::dataset::{PartClass, Split};
use crate::encoding::{EncodedSplit, PreparedData};
use crate::runtime::{create_device, RuntimeConfig};

/// Mixed into the seed for the per-epoch shuffles.
const EPOCH_SEED_OFFSET: u64 = 0x5eed;
/// Mixed into the seed for the initial weights.
const INIT_SEED_OFFSET: u64 = 2;
/// Mixed into the seed for the dropout masks.
const DROPOUT_SEED_OFFSET: u64 = 3;

/// Loss and accuracy of one pass over the training partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch: usize,
    /// Mean categorical cross-entropy over the training samples
    pub loss: f64,
    pub accuracy: f64,
    /// `None` when the validation partition is empty
    pub validation_accuracy: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochStats>,
}

impl TrainingHistory {
    pub fn last(&self) -> Option<&EpochStats> {
        self.epochs.last()
    }
}

/// A builder that trains a Classifier from prepared data.
#[derive(Debug, Default)]
pub struct ClassifierBuilder {
    training_config: TrainingConfig,
    runtime_config: RuntimeConfig,
    vocabulary: Option<Vocabulary>,
    sequence_length: Option<usize>,
    train: Option<EncodedSplit>,
    validation: Option<EncodedSplit>,
}

impl ClassifierBuilder {
    /// Creates a builder with the default hyperparameters and a CPU runtime
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hyperparameters used by `build`
    ///
    /// # Errors
    /// - `ConfigError` if the configuration cannot be trained with
    pub fn with_training_config(mut self, config: TrainingConfig) -> Result<Self, ClassifierError> {
        config.validate()?;
        self.training_config = config;
        Ok(self)
    }

    /// Sets the device the network trains and runs on
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Uses the vocabulary, sequence length and partitions of `data`.
    ///
    /// # Errors
    /// - `ConfigError` if the training partition is empty
    /// - `ConfigError` if the vocabulary is empty
    pub fn with_data(mut self, data: &PreparedData) -> Result<Self, ClassifierError> {
        if data.vocabulary.is_empty() {
            return Err(ClassifierError::ConfigError("Vocabulary is empty".into()));
        }
        let train = data.dataset.encoded(Split::Train)?;
        if train.is_empty() {
            return Err(ClassifierError::ConfigError("Training partition is empty".into()));
        }
        let validation = data.dataset.encoded(Split::Validation)?;
        if validation.is_empty() {
            warn!("Validation partition is empty; validation accuracy will not be reported");
        }

        self.vocabulary = Some(data.vocabulary.clone());
        self.sequence_length = Some(data.dataset.sequence_length);
        self.train = Some(train);
        self.validation = Some(validation);
        Ok(self)
    }

    /// Trains and returns the classifier.
    pub fn build(self) -> Result<Classifier, ClassifierError> {
        self.train().map(|(classifier, _)| classifier)
    }

    /// Trains for the configured number of epochs.
    ///
    /// There is no early stopping; every epoch runs and the final weights are
    /// kept whatever the accuracy.
    pub fn train(self) -> Result<(Classifier, TrainingHistory), ClassifierError> {
        let vocabulary = self
            .vocabulary
            .ok_or_else(|| ClassifierError::BuildError("Training data must be set".into()))?;
        let sequence_length = self
            .sequence_length
            .ok_or_else(|| ClassifierError::BuildError("Sequence length not set".into()))?;
        let train = self
            .train
            .ok_or_else(|| ClassifierError::BuildError("Training partition not set".into()))?;
        let validation = self.validation.filter(|v| !v.is_empty());
        let cfg = self.training_config;

        let device = create_device(&self.runtime_config);
        let model_config = ModelConfig {
            input_size: vocabulary.input_size(),
            embedding_dim: cfg.embedding_dim,
            hidden_size: cfg.hidden_size,
            num_classes: PartClass::COUNT,
            dropout: cfg.dropout,
            recurrent_dropout: cfg.recurrent_dropout,
            sequence_length,
        };

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let net = PartNumberNet::new(&model_config, vb)?;
        init_weights(&varmap, &mut StdRng::seed_from_u64(cfg.seed.wrapping_add(INIT_SEED_OFFSET)))?;
        info!(
            "Built network with {} parameters ({} train / {} validation samples)",
            model_config.parameter_count(),
            train.len(),
            validation.as_ref().map_or(0, EncodedSplit::len)
        );

        let mut optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: cfg.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        // The classifier shares its variables with the optimizer, so it always
        // sees the current weights.
        let classifier = Classifier::new(vocabulary, model_config, net.clone(), varmap.clone(), device.clone());

        let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(EPOCH_SEED_OFFSET));
        let mut dropout_rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(DROPOUT_SEED_OFFSET));
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut history = TrainingHistory::default();

        for epoch in 1..=cfg.epochs {
            order.shuffle(&mut rng);
            let mut loss_sum = 0f64;
            let mut correct = 0usize;

            for chunk in order.chunks(cfg.batch_size) {
                let (ids, targets) = batch_tensors(&train, chunk, &device)?;
                let logits = net.forward_t(&ids, Some(&mut dropout_rng))?;
                let loss = candle_nn::loss::cross_entropy(&logits, &targets)?;
                optimizer.backward_step(&loss)?;

                loss_sum += loss.to_scalar::<f32>()? as f64 * chunk.len() as f64;
                let predicted = logits.argmax(D::Minus1)?.to_vec1::<u32>()?;
                correct += predicted
                    .iter()
                    .zip(chunk)
                    .filter(|(p, i)| **p == train.labels[**i])
                    .count();
            }

            let validation_accuracy = match &validation {
                Some(val) => Some(accuracy(&classifier, val)?),
                None => None,
            };
            let stats = EpochStats {
                epoch,
                loss: loss_sum / train.len() as f64,
                accuracy: correct as f64 / train.len() as f64,
                validation_accuracy,
            };
            info!(
                "Epoch {}/{}: loss {:.4}, accuracy {:.4}, validation accuracy {}",
                epoch,
                cfg.epochs,
                stats.loss,
                stats.accuracy,
                stats
                    .validation_accuracy
                    .map_or_else(|| "n/a".to_string(), |a| format!("{:.4}", a))
            );
            history.epochs.push(stats);
        }

        Ok((classifier, history))
    }
}

fn batch_tensors(split: &EncodedSplit, rows: &[usize], device: &Device) -> Result<(Tensor, Tensor), ClassifierError> {
    let length = split.sequences.ncols();
    let mut flat = Vec::with_capacity(rows.len() * length);
    for &i in rows {
        flat.extend(split.sequences.row(i).iter().copied());
    }
    let targets: Vec<u32> = rows.iter().map(|&i| split.labels[i]).collect();
    let ids = Tensor::from_vec(flat, (rows.len(), length), device)?;
    let targets = Tensor::from_vec(targets, rows.len(), device)?;
    Ok((ids, targets))
}

fn accuracy(classifier: &Classifier, split: &EncodedSplit) -> Result<f64, ClassifierError> {
    let probs = classifier.predict_encoded(split.sequences.view())?;
    let correct = probs
        .outer_iter()
        .zip(split.labels.iter())
        .filter(|(row, label)| argmax(row.view()) == Some(**label as usize))
        .count();
    Ok(correct as f64 / split.len() as f64)
}
