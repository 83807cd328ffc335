//! Typed samples, CSV loading, class balancing and train/validation assignment.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierError;
use crate::config::DatasetConfig;

/// The three categories a part identifier can belong to.
///
/// The discriminant is the integer label used in the input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PartClass {
    /// Manufacturer part number
    Mpn = 0,
    MouserSku = 1,
    DigikeySku = 2,
}

impl PartClass {
    pub const COUNT: usize = 3;
    pub const ALL: [PartClass; PartClass::COUNT] =
        [PartClass::Mpn, PartClass::MouserSku, PartClass::DigikeySku];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Mpn => "MPN",
            Self::MouserSku => "Mouser SKU",
            Self::DigikeySku => "Digi-Key SKU",
        }
    }
}

impl fmt::Display for PartClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for PartClass {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(value as usize).ok_or_else(|| format!("invalid class label {}", value))
    }
}

impl From<PartClass> for u8 {
    fn from(class: PartClass) -> Self {
        class as u8
    }
}

/// One labelled identifier from the input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub part_number: String,
    pub label: PartClass,
}

impl Sample {
    pub fn new(part_number: impl Into<String>, label: PartClass) -> Self {
        Self {
            part_number: part_number.into(),
            label,
        }
    }
}

/// Partition a sample is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Split {
    #[serde(rename = "train")]
    Train,
    #[serde(rename = "val")]
    Validation,
}

/// An ordered collection of samples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Loads samples from a delimited file with a header row.
    pub fn load<P: AsRef<Path>>(path: P, config: &DatasetConfig) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        info!("Loading dataset from {:?}", path);
        let file = File::open(path)
            .map_err(|e| ClassifierError::DataError(format!("Failed to open {:?}: {}", path, e)))?;
        Self::from_reader(file, config)
    }

    /// Reads samples from any CSV source.
    ///
    /// Columns are located by header name; all other columns are ignored.
    pub fn from_reader<R: Read>(reader: R, config: &DatasetConfig) -> Result<Self, ClassifierError> {
        config.validate()?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(config.delimiter_byte()?)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let column = |name: &str| {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                ClassifierError::ConfigError(format!(
                    "Input is missing required column '{}' (found: {})",
                    name,
                    headers.iter().collect::<Vec<_>>().join(", ")
                ))
            })
        };
        let text_idx = column(&config.text_column)?;
        let label_idx = column(&config.label_column)?;

        let mut samples = Vec::new();
        let mut skipped = 0usize;
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            let row = i + 1;

            let part_number = record.get(text_idx).unwrap_or("");
            if part_number.is_empty() {
                warn!("Skipping record {}: empty '{}'", row, config.text_column);
                skipped += 1;
                continue;
            }

            let raw_label = record.get(label_idx).unwrap_or("");
            let label = raw_label
                .parse::<usize>()
                .ok()
                .and_then(PartClass::from_index)
                .ok_or_else(|| {
                    ClassifierError::DataError(format!(
                        "Record {}: label {:?} is not one of 0, 1, 2",
                        row, raw_label
                    ))
                })?;

            samples.push(Sample::new(part_number, label));
        }

        info!("Loaded {} samples ({} skipped)", samples.len(), skipped);
        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    /// Number of samples per class, indexed by `PartClass::index`.
    pub fn class_counts(&self) -> [usize; PartClass::COUNT] {
        let mut counts = [0; PartClass::COUNT];
        for sample in &self.samples {
            counts[sample.label.index()] += 1;
        }
        counts
    }

    /// Length in characters of the longest identifier.
    pub fn max_len(&self) -> usize {
        self.samples
            .iter()
            .map(|s| s.part_number.chars().count())
            .max()
            .unwrap_or(0)
    }

    /// Caps every class at the size of the smallest one, then shuffles.
    ///
    /// Truncation keeps the first samples of each class in input order. A class
    /// with no samples at all is a configuration error.
    pub fn balance(&self, seed: u64) -> Result<Dataset, ClassifierError> {
        let counts = self.class_counts();
        debug!("Class counts before balancing: {:?}", counts);

        let empty: Vec<&str> = PartClass::ALL
            .iter()
            .filter(|class| counts[class.index()] == 0)
            .map(|class| class.name())
            .collect();
        if !empty.is_empty() {
            return Err(ClassifierError::ConfigError(format!(
                "Cannot balance dataset: no samples for class(es) {}",
                empty.join(", ")
            )));
        }

        let limit = counts.iter().copied().min().unwrap_or(0);
        let mut balanced = Vec::with_capacity(limit * PartClass::COUNT);
        for class in PartClass::ALL {
            balanced.extend(
                self.samples
                    .iter()
                    .filter(|s| s.label == class)
                    .take(limit)
                    .cloned(),
            );
        }

        let mut rng = StdRng::seed_from_u64(seed);
        balanced.shuffle(&mut rng);

        info!(
            "Balanced dataset to {} samples per class ({} total, {} dropped)",
            limit,
            balanced.len(),
            self.samples.len() - balanced.len()
        );
        Ok(Dataset { samples: balanced })
    }
}

/// Assigns each of `count` samples to train or validation independently.
pub fn assign_splits(count: usize, train_ratio: f64, seed: u64) -> Vec<Split> {
    let mut rng = StdRng::seed_from_u64(seed);
    let splits: Vec<Split> = (0..count)
        .map(|_| {
            if rng.random::<f64>() < train_ratio {
                Split::Train
            } else {
                Split::Validation
            }
        })
        .collect();

    let train = splits.iter().filter(|s| **s == Split::Train).count();
    info!("Split assignment: {} train, {} validation", train, count - train);
    splits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv_config() -> DatasetConfig {
        DatasetConfig::default()
    }

    #[test]
    fn test_load_ignores_metadata_columns() {
        let input = "distributor,part_number,price,label\n\
                     digikey,296-8521-1-ND,0.52,2\n\
                     mouser,595-SN74LVC541APWR,0.61,1\n\
                     ti,SN74LVC541APWR,0.40,0\n";
        let dataset = Dataset::from_reader(input.as_bytes(), &csv_config()).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.samples()[0], Sample::new("296-8521-1-ND", PartClass::DigikeySku));
        assert_eq!(dataset.samples()[2].label, PartClass::Mpn);
    }

    #[test]
    fn test_missing_column_is_config_error() {
        let input = "part_number,price\nSN74LVC541APWR,0.40\n";
        let result = Dataset::from_reader(input.as_bytes(), &csv_config());
        match result {
            Err(ClassifierError::ConfigError(msg)) => assert!(msg.contains("label")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_label_is_data_error() {
        let input = "part_number,label\nSN74LVC541APWR,0\nLM358,7\n";
        let result = Dataset::from_reader(input.as_bytes(), &csv_config());
        match result {
            Err(ClassifierError::DataError(msg)) => assert!(msg.contains("Record 2")),
            other => panic!("expected data error, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_identifiers_are_skipped() {
        let input = "part_number,label\n,1\nLM358,0\n";
        let dataset = Dataset::from_reader(input.as_bytes(), &csv_config()).unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_balance_caps_every_class_at_minimum() {
        let mut samples = Vec::new();
        for i in 0..10 {
            samples.push(Sample::new(format!("MPN{}", i), PartClass::Mpn));
        }
        for i in 0..4 {
            samples.push(Sample::new(format!("595-{}", i), PartClass::MouserSku));
        }
        for i in 0..7 {
            samples.push(Sample::new(format!("{}-ND", i), PartClass::DigikeySku));
        }
        let balanced = Dataset::new(samples).balance(7).unwrap();
        assert_eq!(balanced.class_counts(), [4, 4, 4]);

        // Truncation keeps the first samples of each class.
        assert!(balanced.samples().iter().any(|s| s.part_number == "MPN0"));
        assert!(!balanced.samples().iter().any(|s| s.part_number == "MPN9"));
    }

    #[test]
    fn test_balance_is_deterministic() {
        let samples: Vec<Sample> = (0..30)
            .map(|i| Sample::new(format!("P{}", i), PartClass::from_index(i % 3).unwrap()))
            .collect();
        let dataset = Dataset::new(samples);
        assert_eq!(dataset.balance(11).unwrap(), dataset.balance(11).unwrap());
    }

    #[test]
    fn test_balance_rejects_empty_class() {
        let dataset = Dataset::new(vec![
            Sample::new("LM358", PartClass::Mpn),
            Sample::new("595-LM358", PartClass::MouserSku),
        ]);
        match dataset.balance(1) {
            Err(ClassifierError::ConfigError(msg)) => assert!(msg.contains("Digi-Key SKU")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_split_ratio_converges() {
        let splits = assign_splits(20_000, 0.8, 42);
        let train = splits.iter().filter(|s| **s == Split::Train).count() as f64;
        let ratio = train / splits.len() as f64;
        assert!((ratio - 0.8).abs() < 0.02, "ratio was {}", ratio);
        assert_eq!(splits, assign_splits(20_000, 0.8, 42));
    }

    #[test]
    fn test_part_class_serde_uses_integer_labels() {
        assert_eq!(serde_json::to_string(&PartClass::DigikeySku).unwrap(), "2");
        let class: PartClass = serde_json::from_str("1").unwrap();
        assert_eq!(class, PartClass::MouserSku);
        assert!(serde_json::from_str::<PartClass>("3").is_err());
        assert_eq!(serde_json::to_string(&Split::Validation).unwrap(), "\"val\"");
    }
}
