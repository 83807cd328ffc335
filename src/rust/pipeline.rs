//! The end-to-end training run: load, balance, encode, split, train,
//! evaluate and snapshot.

use std::path::Path;

use log::{info, warn};

use crate::classifier::{Classifier, ClassifierError, TrainingHistory};
use crate::config::PipelineConfig;
use crate::dataset::{Dataset, Split};
use crate::encoding::PreparedData;
use crate::evaluation::{evaluate, EvaluationReport};
use crate::snapshot::{SnapshotError, SnapshotStore};

/// Mixed into the seed for the split assignment.
const SPLIT_SEED_OFFSET: u64 = 1;

#[derive(Debug)]
pub struct PipelineOutput {
    pub classifier: Classifier,
    pub data: PreparedData,
    pub history: TrainingHistory,
    /// `None` when the validation partition came out empty
    pub evaluation: Option<EvaluationReport>,
}

/// Runs every step up to and including evaluation on an in-memory dataset.
///
/// Configuration problems (an empty class, invalid hyperparameters) abort
/// before any training happens.
pub fn train(dataset: &Dataset, config: &PipelineConfig) -> Result<PipelineOutput, ClassifierError> {
    config.validate()?;
    let training = &config.training;

    let balanced = dataset.balance(training.seed)?;
    let data = PreparedData::prepare(
        &balanced,
        training.train_ratio,
        training.seed.wrapping_add(SPLIT_SEED_OFFSET),
    )?;

    let (classifier, history) = Classifier::builder()
        .with_training_config(training.clone())?
        .with_runtime_config(config.runtime.clone())
        .with_data(&data)?
        .train()?;

    let validation = data.dataset.encoded(Split::Validation)?;
    let evaluation = if validation.is_empty() {
        warn!("Skipping evaluation: validation partition is empty");
        None
    } else {
        Some(evaluate(&classifier, &validation)?)
    };

    Ok(PipelineOutput {
        classifier,
        data,
        history,
        evaluation,
    })
}

/// Loads `data_path`, trains, evaluates and writes the snapshot to `out_dir`.
pub fn run<P, Q>(data_path: P, out_dir: Q, config: &PipelineConfig) -> Result<PipelineOutput, SnapshotError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    config.validate()?;
    let dataset = Dataset::load(data_path, &config.dataset)?;
    let output = train(&dataset, config)?;

    let store = SnapshotStore::new(out_dir)?;
    store.write(&output.classifier, &output.data.dataset)?;
    info!("Pipeline complete, snapshot at {:?}", store.dir());
    Ok(output)
}
