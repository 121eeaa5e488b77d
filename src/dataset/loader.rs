//! Caltech-101 sample index
//!
//! Reads a split manifest (`train.txt` / `test.txt`) and turns every accepted line into a
//! `(path, label)` sample. A line is `<class_dir>/<file_name>` relative to
//! `101_ObjectCategories`; the class is taken from the directory part.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{has_image_extension, LabelIndex, Split, BACKGROUND_CLASS, CATEGORIES_DIR, IMG_EXTENSIONS};
use crate::utils::error::{CaltechError, Result};

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Full path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
}

/// Build the ordered sample list for one split
///
/// Manifest order is preserved. Lines naming the background class or carrying an
/// unsupported extension are skipped; a line whose class is unknown to `labels` is an
/// index-build error, and so is a split that ends up with no samples.
pub fn build_samples<P: AsRef<Path>>(
    root: P,
    labels: &LabelIndex,
    split: Split,
    extensions: &[&str],
) -> Result<Vec<Sample>> {
    let root = root.as_ref();
    let manifest = root.join(split.manifest_name());
    let contents = std::fs::read_to_string(&manifest).map_err(|e| {
        CaltechError::IndexBuild(format!("Cannot read manifest {:?}: {}", manifest, e))
    })?;

    let categories = root.join(CATEGORIES_DIR);
    let mut samples = Vec::new();
    let mut skipped = 0usize;

    for (line_no, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let class_name = match line.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => {
                return Err(CaltechError::IndexBuild(format!(
                    "{}:{}: entry '{}' has no class directory",
                    split.manifest_name(),
                    line_no + 1,
                    line
                )))
            }
        };

        if class_name == BACKGROUND_CLASS {
            skipped += 1;
            continue;
        }

        if !has_image_extension(line, extensions) {
            debug!("Skipping '{}': unsupported extension", line);
            skipped += 1;
            continue;
        }

        let label = labels.index_of(class_name).ok_or_else(|| {
            CaltechError::IndexBuild(format!(
                "{}:{}: unknown class '{}'",
                split.manifest_name(),
                line_no + 1,
                class_name
            ))
        })?;

        samples.push(Sample {
            path: categories.join(line),
            label,
        });
    }

    if samples.is_empty() {
        return Err(CaltechError::IndexBuild(format!(
            "Found 0 files in {} split of {:?}. Supported extensions are: {}",
            split,
            root,
            extensions.join(",")
        )));
    }

    info!(
        "Indexed {} samples for {} split ({} lines skipped)",
        samples.len(),
        split,
        skipped
    );
    Ok(samples)
}

/// One manifest split of the Caltech-101 dataset
#[derive(Debug, Clone)]
pub struct CaltechDataset {
    /// Dataset root (contains `101_ObjectCategories` and the manifests)
    pub root: PathBuf,
    pub split: Split,
    pub labels: LabelIndex,
    pub samples: Vec<Sample>,
}

impl CaltechDataset {
    /// Build the label index and the sample index for `split`
    pub fn new<P: AsRef<Path>>(root: P, split: Split) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        info!("Loading Caltech-101 {} split from: {:?}", split, root);

        let labels = LabelIndex::scan(&root)?;
        Self::with_labels(root, split, labels)
    }

    /// Build the sample index for `split` against an existing label index
    pub fn with_labels<P: AsRef<Path>>(root: P, split: Split, labels: LabelIndex) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let samples = build_samples(&root, &labels, split, &IMG_EXTENSIONS)?;

        Ok(Self {
            root,
            split,
            labels,
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    /// Label of every sample, in sample order
    pub fn targets(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }
}

/// Per-class sample counts for a set of samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub num_classes: usize,
    pub class_counts: Vec<usize>,
    pub class_names: Vec<String>,
}

impl DatasetStats {
    pub fn from_samples(labels: &LabelIndex, samples: &[Sample]) -> Self {
        let mut class_counts = vec![0usize; labels.len()];
        for sample in samples {
            if let Some(count) = class_counts.get_mut(sample.label) {
                *count += 1;
            } else {
                warn!("Sample {:?} has label {} outside the index", sample.path, sample.label);
            }
        }

        Self {
            total_samples: samples.len(),
            num_classes: labels.len(),
            class_counts,
            class_names: labels.classes().to_vec(),
        }
    }

    /// Classes without any sample
    pub fn empty_classes(&self) -> Vec<&str> {
        self.class_counts
            .iter()
            .zip(self.class_names.iter())
            .filter(|(count, _)| **count == 0)
            .map(|(_, name)| name.as_str())
            .collect()
    }

    /// Print statistics to console, most frequent classes first
    pub fn print(&self) {
        println!("\n📊 Dataset Statistics:");
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.num_classes);
        println!("\n  Samples per class:");

        let max_count = self.class_counts.iter().copied().max().unwrap_or(0).max(1);
        let mut order: Vec<usize> = (0..self.num_classes).collect();
        order.sort_by(|&a, &b| self.class_counts[b].cmp(&self.class_counts[a]).then(a.cmp(&b)));

        for idx in order {
            let count = self.class_counts[idx];
            let bar_len = (count as f32 / max_count as f32 * 40.0) as usize;
            let bar: String = "█".repeat(bar_len);
            println!("    {:3}. {:30} {:5} {}", idx, self.class_names[idx], count, bar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn fixture(manifest: &str) -> TempDir {
        let dir = tempdir().unwrap();
        let categories = dir.path().join(CATEGORIES_DIR);
        for name in ["cat", "dog", BACKGROUND_CLASS] {
            std::fs::create_dir_all(categories.join(name)).unwrap();
        }
        std::fs::write(dir.path().join("train.txt"), manifest).unwrap();
        dir
    }

    #[test]
    fn test_build_samples_preserves_order() {
        let dir = fixture("dog/image_0002.jpg\ncat/image_0001.jpg\ndog/image_0001.JPG\n");
        let labels = LabelIndex::scan(dir.path()).unwrap();
        let samples = build_samples(dir.path(), &labels, Split::Train, &IMG_EXTENSIONS).unwrap();

        let labels_seen: Vec<usize> = samples.iter().map(|s| s.label).collect();
        assert_eq!(labels_seen, vec![1, 0, 1]);
        assert!(samples[1]
            .path
            .ends_with(Path::new(CATEGORIES_DIR).join("cat/image_0001.jpg")));
    }

    #[test]
    fn test_background_and_extensions_skipped() {
        let dir = fixture("BACKGROUND_Google/image_0001.jpg\ncat/notes.txt\n\ncat/image_0003.png\r\n");
        let labels = LabelIndex::scan(dir.path()).unwrap();
        let samples = build_samples(dir.path(), &labels, Split::Train, &IMG_EXTENSIONS).unwrap();

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label, 0);
    }

    #[test]
    fn test_unknown_class_is_error() {
        let dir = fixture("cat/image_0001.jpg\nhorse/image_0001.jpg\n");
        let labels = LabelIndex::scan(dir.path()).unwrap();
        let err = build_samples(dir.path(), &labels, Split::Train, &IMG_EXTENSIONS).unwrap_err();
        assert!(err.is_index_build());
        assert!(err.to_string().contains("horse"));
    }

    #[test]
    fn test_empty_split_is_error() {
        let dir = fixture("BACKGROUND_Google/image_0001.jpg\n");
        let labels = LabelIndex::scan(dir.path()).unwrap();
        let err = build_samples(dir.path(), &labels, Split::Train, &IMG_EXTENSIONS).unwrap_err();
        assert!(err.is_index_build());
        assert!(err.to_string().contains(".jpg"));
    }

    #[test]
    fn test_missing_manifest_is_error() {
        let dir = fixture("cat/image_0001.jpg\n");
        let labels = LabelIndex::scan(dir.path()).unwrap();
        let err = build_samples(dir.path(), &labels, Split::Test, &IMG_EXTENSIONS).unwrap_err();
        assert!(err.is_index_build());
    }

    #[test]
    fn test_dataset_stats() {
        let dir = fixture("cat/a.jpg\ncat/b.jpg\ncat/c.jpg\n");
        let dataset = CaltechDataset::new(dir.path(), Split::Train).unwrap();
        assert_eq!(dataset.targets(), vec![0, 0, 0]);

        let stats = DatasetStats::from_samples(&dataset.labels, &dataset.samples);
        assert_eq!(stats.class_counts, vec![3, 0]);
        assert_eq!(stats.empty_classes(), vec!["dog"]);
    }
}
