//! Classification metrics
//!
//! Confusion matrix with per-class precision / recall / F1, used by the evaluation
//! routine for its final report.

use serde::{Deserialize, Serialize};

/// Confusion matrix for multi-class classification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Row-major counts (row = actual, column = predicted)
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Record one prediction; out-of-range indices are ignored
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    /// Record a batch of (actual, predicted) pairs
    pub fn extend(&mut self, actual: &[usize], predicted: &[usize]) {
        for (&a, &p) in actual.iter().zip(predicted.iter()) {
            self.add(a, p);
        }
    }

    /// Count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Per-class precision / recall / F1
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        (0..self.num_classes)
            .map(|class_idx| ClassMetrics::from_confusion_matrix(self, class_idx))
            .collect()
    }

    /// Macro-averaged F1 over the classes that actually occur
    pub fn macro_f1(&self) -> f64 {
        let present: Vec<ClassMetrics> = self
            .class_metrics()
            .into_iter()
            .filter(|m| m.support > 0)
            .collect();

        if present.is_empty() {
            return 0.0;
        }
        present.iter().map(|m| m.f1).sum::<f64>() / present.len() as f64
    }
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_idx: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let tp = cm.get(class_idx, class_idx);

        let fp: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        let fn_: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let precision = if tp + fp > 0 {
            tp as f64 / (tp + fp) as f64
        } else {
            0.0
        };
        let recall = if tp + fn_ > 0 {
            tp as f64 / (tp + fn_) as f64
        } else {
            0.0
        };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            precision,
            recall,
            f1,
            support: tp + fn_,
        }
    }
}
