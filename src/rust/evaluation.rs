//! Validation accuracy, per-class accuracy and the confusion matrix.

use std::fmt::Write as _;

use log::info;
use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::classifier::utils::{argmax, normalize_rows};
use crate::classifier::{Classifier, ClassifierError};
use crate::dataset::PartClass;
use crate::encoding::EncodedSplit;

/// Accuracy restricted to the samples of one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassAccuracy {
    pub class: PartClass,
    /// Number of samples of this class that were scored
    pub support: usize,
    /// `None` when there were no samples of this class
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub samples: usize,
    pub accuracy: f64,
    pub per_class: Vec<ClassAccuracy>,
    /// Raw counts, `confusion[[true, predicted]]`
    pub confusion: Array2<f64>,
}

/// Scores `split` with `classifier`.
pub fn evaluate(classifier: &Classifier, split: &EncodedSplit) -> Result<EvaluationReport, ClassifierError> {
    if split.is_empty() {
        return Err(ClassifierError::ValidationError("Cannot evaluate an empty partition".into()));
    }
    let probabilities = classifier.predict_encoded(split.sequences.view())?;
    let report = EvaluationReport::from_probabilities(probabilities.view(), split.labels.view())?;
    info!("Validation accuracy {:.4} over {} samples", report.accuracy, report.samples);
    for class in &report.per_class {
        match class.accuracy {
            Some(acc) => info!("  {}: {:.4} ({} samples)", class.class, acc, class.support),
            None => info!("  {}: no samples", class.class),
        }
    }
    Ok(report)
}

impl EvaluationReport {
    /// Builds the report from softmax rows and true class indices.
    pub fn from_probabilities(
        probabilities: ArrayView2<'_, f32>,
        labels: ArrayView1<'_, u32>,
    ) -> Result<Self, ClassifierError> {
        if probabilities.nrows() != labels.len() {
            return Err(ClassifierError::ValidationError(format!(
                "{} predictions for {} labels",
                probabilities.nrows(),
                labels.len()
            )));
        }

        let mut confusion = Array2::<f64>::zeros((PartClass::COUNT, PartClass::COUNT));
        for (row, &label) in probabilities.outer_iter().zip(labels.iter()) {
            let predicted = argmax(row).ok_or_else(|| {
                ClassifierError::PredictionError("Empty probability row".into())
            })?;
            let truth = label as usize;
            if truth >= PartClass::COUNT || predicted >= PartClass::COUNT {
                return Err(ClassifierError::ValidationError(format!(
                    "Class index out of range (true {}, predicted {})",
                    truth, predicted
                )));
            }
            confusion[[truth, predicted]] += 1.0;
        }

        let samples = labels.len();
        let correct: f64 = confusion.diag().sum();
        let accuracy = if samples > 0 { correct / samples as f64 } else { 0.0 };

        let per_class = PartClass::ALL
            .iter()
            .map(|&class| {
                let row = confusion.row(class.index());
                let support = row.sum() as usize;
                ClassAccuracy {
                    class,
                    support,
                    accuracy: (support > 0).then(|| row[class.index()] / support as f64),
                }
            })
            .collect();

        Ok(Self {
            samples,
            accuracy,
            per_class,
            confusion,
        })
    }

    pub fn class_accuracy(&self, class: PartClass) -> Option<f64> {
        self.per_class[class.index()].accuracy
    }

    /// Share of each true class that ended up in each predicted class.
    ///
    /// Rows sum to 1, or are all zeros for a class with no samples.
    pub fn cross_category_bleeding(&self) -> Array2<f64> {
        normalize_rows(&self.confusion)
    }

    /// Graphviz rendering of `cross_category_bleeding`.
    pub fn to_dot(&self) -> String {
        let labels: Vec<&str> = PartClass::ALL.iter().map(|c| c.name()).collect();
        render_dot(self.cross_category_bleeding().view(), &labels)
    }
}

/// Renders a row-normalized confusion matrix as a directed graph.
///
/// One node per class, one edge per non-zero cell labelled with its
/// percentage. Classes beyond `labels` are named `Category <n>`.
pub fn render_dot(matrix: ArrayView2<'_, f64>, labels: &[&str]) -> String {
    let label = |c: usize| {
        labels
            .get(c)
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("Category {}", c))
    };

    let mut out = String::from("digraph {\n");
    for (truth, row) in matrix.outer_iter().enumerate() {
        let _ = writeln!(out, "    C{} [label=\"{}\"]", truth, label(truth));
        for (predicted, &share) in row.iter().enumerate() {
            if share > 0.0 {
                let _ = writeln!(
                    out,
                    "    C{} -> C{} [label=\"{:.3}%\"]",
                    truth,
                    predicted,
                    share * 100.0
                );
            }
        }
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn report() -> EvaluationReport {
        // true labels: 0, 0, 1, 1, 2, 2 ; predicted: 0, 1, 1, 1, 2, 0
        let probs = array![
            [0.8f32, 0.1, 0.1],
            [0.2, 0.7, 0.1],
            [0.1, 0.8, 0.1],
            [0.3, 0.6, 0.1],
            [0.1, 0.1, 0.8],
            [0.5, 0.2, 0.3],
        ];
        let labels = array![0u32, 0, 1, 1, 2, 2];
        EvaluationReport::from_probabilities(probs.view(), labels.view()).unwrap()
    }

    #[test]
    fn test_overall_and_per_class_accuracy() {
        let report = report();
        assert_eq!(report.samples, 6);
        assert!((report.accuracy - 4.0 / 6.0).abs() < 1e-12);
        assert_eq!(report.class_accuracy(PartClass::Mpn), Some(0.5));
        assert_eq!(report.class_accuracy(PartClass::MouserSku), Some(1.0));
        assert_eq!(report.class_accuracy(PartClass::DigikeySku), Some(0.5));
    }

    #[test]
    fn test_bleeding_rows_sum_to_one_and_diagonal_is_class_accuracy() {
        let report = report();
        let bleeding = report.cross_category_bleeding();
        for class in PartClass::ALL {
            let row = bleeding.row(class.index());
            assert!((row.sum() - 1.0).abs() < 1e-12);
            assert_eq!(Some(row[class.index()]), report.class_accuracy(class));
        }
    }

    #[test]
    fn test_class_without_samples() {
        let probs = array![[0.9f32, 0.05, 0.05]];
        let labels = array![0u32];
        let report = EvaluationReport::from_probabilities(probs.view(), labels.view()).unwrap();
        assert_eq!(report.class_accuracy(PartClass::DigikeySku), None);
        assert_eq!(report.cross_category_bleeding().row(2).sum(), 0.0);
    }

    #[test]
    fn test_mismatched_lengths() {
        let probs = array![[0.9f32, 0.05, 0.05]];
        let labels = array![0u32, 1];
        assert!(EvaluationReport::from_probabilities(probs.view(), labels.view()).is_err());
    }

    #[test]
    fn test_dot_omits_zero_edges() {
        let dot = report().to_dot();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("C0 [label=\"MPN\"]"));
        assert!(dot.contains("C2 [label=\"Digi-Key SKU\"]"));
        assert!(dot.contains("C0 -> C1 [label=\"50.000%\"]"));
        assert!(dot.contains("C1 -> C1 [label=\"100.000%\"]"));
        assert!(!dot.contains("C1 -> C0"));
        assert!(!dot.contains("C1 -> C2"));
    }

    #[test]
    fn test_dot_fallback_labels() {
        let matrix = array![[1.0, 0.0], [0.0, 1.0]];
        let dot = render_dot(matrix.view(), &["only"]);
        assert!(dot.contains("C1 [label=\"Category 1\"]"));
    }
}
