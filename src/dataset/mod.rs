//! Dataset module for Caltech-101 data handling
//!
//! This module provides functionality for:
//! - Building the class label index from the category directories
//! - Reading the `train.txt` / `test.txt` split manifests into (path, label) samples
//! - The deterministic resize / crop / normalize transform pipeline
//! - Burn `Dataset` / `Batcher` integration
//! - Stratified train/validation partitioning of the train split
//! - A prefetching batch provider with shuffle and drop-last policies
//!
//! ## Directory layout
//!
//! ```text
//! root/
//! ├── 101_ObjectCategories/
//! │   ├── BACKGROUND_Google/     (excluded from the label index)
//! │   ├── accordion/
//! │   │   ├── image_0001.jpg
//! │   │   └── ...
//! │   └── ...
//! ├── train.txt                  accordion/image_0002.jpg, one per line
//! └── test.txt
//! ```

pub mod burn_dataset;
pub mod labels;
pub mod loader;
pub mod provider;
pub mod split;
pub mod transform;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::error::CaltechError;

// Re-export main types for convenience
pub use burn_dataset::{CaltechBatch, CaltechBatcher, CaltechBurnDataset, CaltechItem};
pub use labels::LabelIndex;
pub use loader::{build_samples, CaltechDataset, DatasetStats, Sample};
pub use provider::{BatchProvider, BatchProviderConfig};
pub use split::{SplitStats, StratifiedSplit};
pub use transform::{Normalization, Transform};

/// Directory (under the dataset root) holding one sub-directory per class
pub const CATEGORIES_DIR: &str = "101_ObjectCategories";

/// Class excluded from the label index and from every split
pub const BACKGROUND_CLASS: &str = "BACKGROUND_Google";

/// File extensions accepted in the split manifests (compared case-insensitively)
pub const IMG_EXTENSIONS: [&str; 9] = [
    ".jpg", ".jpeg", ".png", ".ppm", ".bmp", ".pgm", ".tif", ".tiff", ".webp",
];

/// Manifest split of the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
}

impl Split {
    /// Name of the manifest file for this split (`train.txt` / `test.txt`)
    pub fn manifest_name(&self) -> String {
        format!("{}.txt", self)
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Test => write!(f, "test"),
        }
    }
}

impl FromStr for Split {
    type Err = CaltechError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "test" => Ok(Split::Test),
            other => Err(CaltechError::Config(format!(
                "Unknown split '{}'. Possible values are: 'train', 'test'",
                other
            ))),
        }
    }
}

/// Whether `file_name` ends in one of the supported image extensions
pub fn has_image_extension(file_name: &str, extensions: &[&str]) -> bool {
    let lower = file_name.to_lowercase();
    extensions.iter().any(|ext| lower.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_name() {
        assert_eq!(Split::Train.manifest_name(), "train.txt");
        assert_eq!(Split::Test.manifest_name(), "test.txt");
    }

    #[test]
    fn test_split_from_str() {
        assert_eq!("TRAIN".parse::<Split>().unwrap(), Split::Train);
        assert!("val".parse::<Split>().unwrap_err().is_config());
    }

    #[test]
    fn test_has_image_extension() {
        assert!(has_image_extension("cat/image_0001.JPG", &IMG_EXTENSIONS));
        assert!(has_image_extension("x.tiff", &IMG_EXTENSIONS));
        assert!(!has_image_extension("notes.txt", &IMG_EXTENSIONS));
        assert!(!has_image_extension("jpg", &IMG_EXTENSIONS));
    }
}
