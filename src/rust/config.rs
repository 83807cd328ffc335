use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierError;
use crate::runtime::RuntimeConfig;

/// Where to find the identifier and label in the input file.
///
/// Every other column is distributor metadata and is ignored by the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Header of the column holding the part number or SKU
    pub text_column: String,
    /// Header of the column holding the integer class label (0, 1 or 2)
    pub label_column: String,
    /// Field delimiter, must be a single ASCII character
    pub delimiter: char,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            text_column: "part_number".to_string(),
            label_column: "label".to_string(),
            delimiter: ',',
        }
    }
}

impl DatasetConfig {
    pub(crate) fn delimiter_byte(&self) -> Result<u8, ClassifierError> {
        if !self.delimiter.is_ascii() {
            return Err(ClassifierError::ConfigError(format!(
                "Delimiter {:?} is not a single ASCII character",
                self.delimiter
            )));
        }
        Ok(self.delimiter as u8)
    }

    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.text_column.is_empty() || self.label_column.is_empty() {
            return Err(ClassifierError::ConfigError("Column names cannot be empty".into()));
        }
        if self.text_column == self.label_column {
            return Err(ClassifierError::ConfigError(format!(
                "Text and label columns must differ (both are '{}')",
                self.text_column
            )));
        }
        self.delimiter_byte().map(|_| ())
    }
}

/// Hyperparameters for the embedding → LSTM → dense network and its training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Width of the per-character embedding vectors
    pub embedding_dim: usize,
    /// Width of the LSTM hidden state
    pub hidden_size: usize,
    /// Dropout rate applied to the LSTM input while training
    pub dropout: f32,
    /// Dropout rate applied to the LSTM recurrent connections while training
    pub recurrent_dropout: f32,
    pub batch_size: usize,
    pub epochs: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Probability that a sample lands in the training partition
    pub train_ratio: f64,
    /// Seed for the balancing shuffle, the split assignment and the epoch shuffles
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 32,
            hidden_size: 32,
            dropout: 0.2,
            recurrent_dropout: 0.2,
            batch_size: 32,
            epochs: 7,
            learning_rate: 1e-3,
            train_ratio: 0.8,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Rejects hyperparameters the training loop cannot run with.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.embedding_dim == 0 || self.hidden_size == 0 {
            return Err(ClassifierError::ConfigError(
                "Embedding and hidden sizes must be positive".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ClassifierError::ConfigError("Batch size must be positive".into()));
        }
        if self.epochs == 0 {
            return Err(ClassifierError::ConfigError("At least one epoch is required".into()));
        }
        for (name, rate) in [("dropout", self.dropout), ("recurrent_dropout", self.recurrent_dropout)] {
            if !(0.0..1.0).contains(&rate) {
                return Err(ClassifierError::ConfigError(format!(
                    "{} must be in [0, 1), got {}",
                    name, rate
                )));
            }
        }
        if !(self.learning_rate > 0.0) {
            return Err(ClassifierError::ConfigError(format!(
                "Learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(ClassifierError::ConfigError(format!(
                "Train ratio must be in (0, 1), got {}",
                self.train_ratio
            )));
        }
        Ok(())
    }
}

/// Everything a pipeline run needs, loadable from a JSON file.
///
/// Every field has a default, so `{}` is a valid configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset: DatasetConfig,
    pub training: TrainingConfig,
    pub runtime: RuntimeConfig,
}

impl PipelineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            ClassifierError::ConfigError(format!("Failed to read config {:?}: {}", path, e))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            ClassifierError::ConfigError(format!("Failed to parse config {:?}: {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClassifierError> {
        self.dataset.validate()?;
        self.training.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_hyperparameters() {
        let config = TrainingConfig::default();
        assert_eq!(config.embedding_dim, 32);
        assert_eq!(config.hidden_size, 32);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.epochs, 7);
        assert!((config.dropout - 0.2).abs() < f32::EPSILON);
        assert!((config.train_ratio - 0.8).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_object_is_valid_config() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"training": {"epochs": 2}, "dataset": {"delimiter": ";"}}"#).unwrap();
        assert_eq!(config.training.epochs, 2);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.dataset.delimiter_byte().unwrap(), b';');
    }

    #[test]
    fn test_invalid_hyperparameters() {
        let mut config = TrainingConfig::default();
        config.batch_size = 0;
        assert!(matches!(config.validate(), Err(ClassifierError::ConfigError(_))));

        let mut config = TrainingConfig::default();
        config.train_ratio = 1.0;
        assert!(config.validate().is_err());

        let mut config = TrainingConfig::default();
        config.recurrent_dropout = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let config = DatasetConfig { delimiter: '§', ..Default::default() };
        assert!(config.validate().is_err());
    }
}
