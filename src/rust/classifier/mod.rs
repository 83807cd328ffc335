mod error;
mod model;
pub mod builder;
#[allow(clippy::module_inception)]
mod classifier;
pub mod utils;
pub mod vocabulary;

pub use builder::{ClassifierBuilder, EpochStats, TrainingHistory};
pub use classifier::{Classifier, Prediction};
pub use error::ClassifierError;
pub use model::{LayerDescription, ModelConfig};
pub use vocabulary::Vocabulary;

/// Information about the current state and configuration of a classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierInfo {
    /// Number of classes the classifier predicts
    pub num_classes: usize,
    /// Labels of the classes, in index order
    pub class_labels: Vec<String>,
    /// Number of distinct characters in the vocabulary
    pub vocabulary_size: usize,
    /// Fixed encoded input length
    pub sequence_length: usize,
    /// Size of the character embedding vectors
    pub embedding_size: usize,
    /// Size of the LSTM hidden state
    pub hidden_size: usize,
    pub parameter_count: usize,
}
