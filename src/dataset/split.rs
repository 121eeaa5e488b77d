//! Stratified train/validation partitioning
//!
//! The manifest train split is divided into a training part and a validation part
//! whose per-class proportions match the overall class distribution as closely as
//! integer counts allow.
//!
//! ## Allocation
//!
//! With `n` samples and train fraction `f`:
//! - `n_train = floor(n * f)`, `n_val = n - n_train`
//! - each class of size `c` first gets `floor(c * n_train / n)` training slots
//! - the slots still missing go one each to the classes with the largest fractional
//!   remainders (ties to the lower class label)
//! - within a class, members are shuffled with the seeded RNG and the first ones go to
//!   the training part
//!
//! The split is a pure function of `(labels, fraction, seed)`.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{CaltechError, Result};

/// Disjoint train / validation index lists over one dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StratifiedSplit {
    /// Training indices, ascending
    pub train: Vec<usize>,
    /// Validation indices, ascending
    pub val: Vec<usize>,
}

impl StratifiedSplit {
    /// Partition `0..labels.len()` by the class in `labels`
    pub fn new(labels: &[usize], train_fraction: f64, seed: u64) -> Result<Self> {
        if !(train_fraction > 0.0 && train_fraction < 1.0) {
            return Err(CaltechError::Config(format!(
                "train fraction must be in (0, 1), got {}",
                train_fraction
            )));
        }

        let n = labels.len();
        let n_train = (n as f64 * train_fraction).floor() as usize;
        let n_val = n - n_train;
        if n_train == 0 || n_val == 0 {
            return Err(CaltechError::Config(format!(
                "train fraction {} over {} samples leaves an empty partition ({} train, {} val)",
                train_fraction, n, n_train, n_val
            )));
        }

        // Group indices by class, classes in ascending label order
        let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (idx, &label) in labels.iter().enumerate() {
            by_class.entry(label).or_default().push(idx);
        }

        let num_classes = by_class.len();
        if n_train < num_classes || n_val < num_classes {
            return Err(CaltechError::Config(format!(
                "{} train / {} val samples cannot cover {} classes",
                n_train, n_val, num_classes
            )));
        }

        let counts: Vec<usize> = by_class.values().map(Vec::len).collect();
        let train_counts = allocate(&counts, n_train);

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut train = Vec::with_capacity(n_train);
        let mut val = Vec::with_capacity(n_val);

        for (members, &take) in by_class.values_mut().zip(train_counts.iter()) {
            members.shuffle(&mut rng);
            let (head, tail) = members.split_at(take);
            train.extend_from_slice(head);
            val.extend_from_slice(tail);
        }

        train.sort_unstable();
        val.sort_unstable();

        Ok(Self { train, val })
    }

    pub fn stats(&self, labels: &[usize]) -> SplitStats {
        let num_classes = labels.iter().copied().max().map_or(0, |m| m + 1);
        let mut train_per_class = vec![0usize; num_classes];
        let mut val_per_class = vec![0usize; num_classes];
        for &i in &self.train {
            train_per_class[labels[i]] += 1;
        }
        for &i in &self.val {
            val_per_class[labels[i]] += 1;
        }

        SplitStats {
            train_size: self.train.len(),
            val_size: self.val.len(),
            train_per_class,
            val_per_class,
        }
    }
}

/// Largest-remainder allocation of `total` slots proportionally to `counts`
fn allocate(counts: &[usize], total: usize) -> Vec<usize> {
    let n: usize = counts.iter().sum();
    if n == 0 {
        return vec![0; counts.len()];
    }

    let mut alloc: Vec<usize> = counts.iter().map(|&c| c * total / n).collect();
    let assigned: usize = alloc.iter().sum();

    // Remainder numerators share the denominator `n`, so compare them directly
    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = counts[a] * total % n;
        let rb = counts[b] * total % n;
        rb.cmp(&ra).then(a.cmp(&b))
    });

    for &class in order.iter().take(total - assigned) {
        alloc[class] += 1;
    }
    alloc
}

/// Sizes of a split, overall and per class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitStats {
    pub train_size: usize,
    pub val_size: usize,
    pub train_per_class: Vec<usize>,
    pub val_per_class: Vec<usize>,
}

impl std::fmt::Display for SplitStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total = (self.train_size + self.val_size).max(1) as f64;
        writeln!(f, "Train/Validation Split:")?;
        writeln!(
            f,
            "  Train: {} ({:.1}%)",
            self.train_size,
            100.0 * self.train_size as f64 / total
        )?;
        writeln!(
            f,
            "  Validation: {} ({:.1}%)",
            self.val_size,
            100.0 * self.val_size as f64 / total
        )?;
        let present = self
            .train_per_class
            .iter()
            .zip(&self.val_per_class)
            .filter(|(t, v)| **t + **v > 0)
            .count();
        writeln!(f, "  Classes represented: {}", present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(per_class: &[usize]) -> Vec<usize> {
        per_class
            .iter()
            .enumerate()
            .flat_map(|(class, &n)| std::iter::repeat(class).take(n))
            .collect()
    }

    #[test]
    fn test_partition_is_disjoint_and_covering() {
        let labels = labels(&[10, 7, 3]);
        let split = StratifiedSplit::new(&labels, 0.5, 42).unwrap();

        assert_eq!(split.train.len(), 10);
        assert_eq!(split.val.len(), 10);

        let mut all: Vec<usize> = split.train.iter().chain(&split.val).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..labels.len()).collect::<Vec<_>>());
        assert!(split.train.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_per_class_proportions() {
        let labels = labels(&[40, 20, 10]);
        let split = StratifiedSplit::new(&labels, 0.5, 7).unwrap();
        let stats = split.stats(&labels);

        assert_eq!(stats.train_per_class, vec![20, 10, 5]);
        assert_eq!(stats.val_per_class, vec![20, 10, 5]);
    }

    #[test]
    fn test_odd_counts_differ_by_at_most_one() {
        let labels = labels(&[5, 3, 9]);
        let split = StratifiedSplit::new(&labels, 0.5, 1).unwrap();
        let stats = split.stats(&labels);

        assert_eq!(stats.train_size, 8);
        assert_eq!(stats.val_size, 9);
        for (t, v) in stats.train_per_class.iter().zip(&stats.val_per_class) {
            assert!((*t as isize - *v as isize).abs() <= 1);
        }
    }

    #[test]
    fn test_reproducibility() {
        let labels = labels(&[12, 9, 4]);
        let a = StratifiedSplit::new(&labels, 0.5, 42).unwrap();
        let b = StratifiedSplit::new(&labels, 0.5, 42).unwrap();
        assert_eq!(a, b);

        let c = StratifiedSplit::new(&labels, 0.5, 43).unwrap();
        assert_eq!(c.train.len(), a.train.len());
    }

    #[test]
    fn test_too_small_is_error() {
        assert!(StratifiedSplit::new(&[0], 0.5, 0).unwrap_err().is_config());
        assert!(StratifiedSplit::new(&[0, 1, 2], 0.5, 0).is_err());
        assert!(StratifiedSplit::new(&[0, 0, 1, 1], 1.0, 0).is_err());
    }

    #[test]
    fn test_allocate_largest_remainder() {
        // 17 samples, 8 slots: exact shares 2.35, 1.41, 4.24
        assert_eq!(allocate(&[5, 3, 9], 8), vec![2, 2, 4]);
        assert_eq!(allocate(&[2, 2], 2), vec![1, 1]);
    }
}
