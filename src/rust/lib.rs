//! A character-level LSTM classifier that tells manufacturer part numbers,
//! Mouser SKUs and Digi-Key SKUs apart.
//!
//! # Basic Usage
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use partclass::{pipeline, PartClass, PipelineConfig};
//!
//! let config = PipelineConfig::default();
//! let output = pipeline::run("parts.csv", "artifacts", &config)?;
//!
//! let prediction = output.classifier.predict("296-8521-1-ND")?;
//! assert_eq!(prediction.label, PartClass::DigikeySku);
//! # Ok(())
//! # }
//! ```
//!
//! # Reusing a trained model
//!
//! Everything the classifier depends on (architecture, weights, vocabulary,
//! sequence length) is stored together and reloaded together:
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use partclass::{RuntimeConfig, SnapshotStore};
//!
//! let store = SnapshotStore::new("artifacts")?;
//! let classifier = store.load(&RuntimeConfig::default())?;
//! for (c, probabilities) in classifier.explain("SN74LVC541APWR")? {
//!     println!("{} {:?}", c, probabilities);
//! }
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod dataset;
pub mod encoding;
pub mod evaluation;
pub mod pipeline;
mod runtime;
pub mod snapshot;

pub use classifier::{
    Classifier, ClassifierBuilder, ClassifierError, ClassifierInfo, Prediction, TrainingHistory, Vocabulary,
};
pub use config::{DatasetConfig, PipelineConfig, TrainingConfig};
pub use dataset::{Dataset, PartClass, Sample, Split};
pub use encoding::{PreparedData, ProcessedDataset, ProcessedRow};
pub use evaluation::EvaluationReport;
pub use runtime::{create_device, RuntimeConfig};
pub use snapshot::{SnapshotError, SnapshotStore};

pub fn init_logger() {
    env_logger::init();
}
