//! Turns a balanced dataset into fixed-length code sequences, one-hot labels
//! and a train/validation assignment.

use log::info;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::classifier::utils::one_hot;
use crate::classifier::{ClassifierError, Vocabulary};
use crate::dataset::{assign_splits, Dataset, PartClass, Split};

/// One fully processed sample, as stored in `dataset.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRow {
    pub part_number: String,
    pub label: PartClass,
    pub split: Split,
    pub sequence: Vec<u32>,
    pub one_hot: Vec<f32>,
}

/// Every processed sample plus the encoded length they share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDataset {
    pub sequence_length: usize,
    pub rows: Vec<ProcessedRow>,
}

/// Sequences and label indices of one partition, ready to batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSplit {
    /// `(samples, sequence_length)` matrix of codes
    pub sequences: Array2<u32>,
    /// Class index of each row
    pub labels: Array1<u32>,
}

impl EncodedSplit {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// The frozen vocabulary together with the data encoded through it.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedData {
    pub vocabulary: Vocabulary,
    pub dataset: ProcessedDataset,
}

/// Encoded length for a corpus whose longest string has `max_len` characters.
pub fn sequence_length_for(max_len: usize) -> usize {
    max_len + 1
}

impl PreparedData {
    /// Builds the vocabulary, encodes every sample and assigns splits.
    ///
    /// `balanced` is expected to be the output of `Dataset::balance`.
    pub fn prepare(balanced: &Dataset, train_ratio: f64, seed: u64) -> Result<Self, ClassifierError> {
        if balanced.is_empty() {
            return Err(ClassifierError::ConfigError("Cannot prepare an empty dataset".into()));
        }

        let vocabulary = Vocabulary::build(balanced.samples().iter().map(|s| s.part_number.as_str()));
        let sequence_length = sequence_length_for(balanced.max_len());
        info!(
            "Vocabulary has {} symbols, sequence length {}",
            vocabulary.len(),
            sequence_length
        );

        let splits = assign_splits(balanced.len(), train_ratio, seed);
        let rows = balanced
            .samples()
            .iter()
            .zip(splits)
            .map(|(sample, split)| {
                Ok(ProcessedRow {
                    part_number: sample.part_number.clone(),
                    label: sample.label,
                    split,
                    sequence: vocabulary.encode_padded(&sample.part_number, sequence_length)?,
                    one_hot: one_hot(sample.label).to_vec(),
                })
            })
            .collect::<Result<Vec<_>, ClassifierError>>()?;

        Ok(Self {
            vocabulary,
            dataset: ProcessedDataset { sequence_length, rows },
        })
    }
}

impl ProcessedDataset {
    pub fn rows_in(&self, split: Split) -> impl Iterator<Item = &ProcessedRow> + '_ {
        self.rows.iter().filter(move |row| row.split == split)
    }

    /// Stacks the rows of one partition into matrices.
    pub fn encoded(&self, split: Split) -> Result<EncodedSplit, ClassifierError> {
        let rows: Vec<&ProcessedRow> = self.rows_in(split).collect();
        let mut flat = Vec::with_capacity(rows.len() * self.sequence_length);
        for row in &rows {
            if row.sequence.len() != self.sequence_length {
                return Err(ClassifierError::ValidationError(format!(
                    "Row {:?} has sequence length {}, expected {}",
                    row.part_number,
                    row.sequence.len(),
                    self.sequence_length
                )));
            }
            flat.extend_from_slice(&row.sequence);
        }
        let sequences = Array2::from_shape_vec((rows.len(), self.sequence_length), flat)
            .map_err(|e| ClassifierError::ValidationError(format!("Failed to build sequence matrix: {}", e)))?;
        let labels = rows.iter().map(|row| row.label.index() as u32).collect();
        Ok(EncodedSplit { sequences, labels })
    }
}
