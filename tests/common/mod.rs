#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use env_logger::{Builder, Env};
use partclass::{Dataset, PartClass, PipelineConfig, Sample, TrainingConfig};

// Initialize test logger
pub fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn")).try_init();
}

/// `per_class` samples of each class with the usual shape of each identifier.
pub fn corpus(per_class: usize) -> Vec<Sample> {
    let mut samples = Vec::new();
    for i in 0..per_class {
        samples.push(Sample::new(format!("SN74LVC{}APWR", 100 + i), PartClass::Mpn));
        samples.push(Sample::new(format!("595-SN74LVC{}A", 100 + i), PartClass::MouserSku));
        samples.push(Sample::new(format!("296-{}-1-ND", 8500 + i), PartClass::DigikeySku));
    }
    samples
}

pub fn dataset(per_class: usize) -> Dataset {
    Dataset::new(corpus(per_class))
}

/// A configuration small enough to train in a test.
pub fn quick_config() -> PipelineConfig {
    PipelineConfig {
        training: TrainingConfig {
            embedding_dim: 8,
            hidden_size: 8,
            batch_size: 16,
            epochs: 2,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Writes samples as CSV with a metadata column around the two used ones.
pub fn write_csv(dir: &Path, samples: &[Sample]) -> PathBuf {
    let mut text = String::from("distributor,part_number,label,stock\n");
    for sample in samples {
        text.push_str(&format!(
            "{},{},{},{}\n",
            sample.label.name(),
            sample.part_number,
            sample.label.index(),
            42
        ));
    }
    let path = dir.join("parts.csv");
    fs::write(&path, text).expect("Failed to write test CSV");
    path
}
