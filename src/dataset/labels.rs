//! Class label index
//!
//! Maps every category directory under `101_ObjectCategories` (except the background
//! class) to a dense integer label. Names are sorted lexicographically by byte value
//! before labels are assigned, so the same directory always yields the same mapping.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use super::{BACKGROUND_CLASS, CATEGORIES_DIR};
use crate::utils::error::{CaltechError, Result};

/// Bijective mapping between class names and labels `0..K`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelIndex {
    classes: Vec<String>,
    class_to_idx: HashMap<String, usize>,
}

impl LabelIndex {
    /// Scan `<root>/101_ObjectCategories` and build the index
    ///
    /// Fails with an index-build error when the background class directory is absent,
    /// since that signals a malformed dataset root.
    pub fn scan<P: AsRef<Path>>(root: P) -> Result<Self> {
        let categories = root.as_ref().join(CATEGORIES_DIR);
        if !categories.is_dir() {
            return Err(CaltechError::IndexBuild(format!(
                "Category directory not found: {:?}",
                categories
            )));
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&categories)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            } else {
                debug!("Skipping non UTF-8 directory name {:?}", entry.file_name());
            }
        }

        let index = Self::from_names(names)?;
        info!(
            "Built label index with {} classes from {:?}",
            index.len(),
            categories
        );
        Ok(index)
    }

    /// Build the index from a list of directory names (background included)
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();

        let before = names.len();
        names.retain(|n| n != BACKGROUND_CLASS);
        if names.len() == before {
            return Err(CaltechError::IndexBuild(format!(
                "Background class '{}' not found among category directories",
                BACKGROUND_CLASS
            )));
        }

        // String ordering is byte-wise, matching a plain sort of directory names
        names.sort();
        names.dedup();

        Ok(Self::from_sorted(names))
    }

    fn from_sorted(classes: Vec<String>) -> Self {
        let class_to_idx = classes
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        Self {
            classes,
            class_to_idx,
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Label of a class name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.class_to_idx.get(name).copied()
    }

    /// Class name of a label
    pub fn class_name(&self, label: usize) -> Option<&str> {
        self.classes.get(label).map(String::as_str)
    }

    /// Class names in label order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_labels_sorted_without_background() {
        let index = LabelIndex::from_names(["dog", "BACKGROUND_Google", "cat", "Faces"]).unwrap();
        // Uppercase sorts before lowercase
        assert_eq!(index.classes(), &["Faces", "cat", "dog"]);
        assert_eq!(index.index_of("cat"), Some(1));
        assert_eq!(index.class_name(2), Some("dog"));
        assert_eq!(index.index_of(BACKGROUND_CLASS), None);
    }

    #[test]
    fn test_missing_background_is_error() {
        let err = LabelIndex::from_names(["cat", "dog"]).unwrap_err();
        assert!(err.is_index_build());
    }

    #[test]
    fn test_scan_directory() {
        let dir = tempdir().unwrap();
        let categories = dir.path().join(CATEGORIES_DIR);
        for name in ["dog", "cat", BACKGROUND_CLASS] {
            std::fs::create_dir_all(categories.join(name)).unwrap();
        }
        // Stray files are not classes
        std::fs::write(categories.join("README"), "x").unwrap();

        let index = LabelIndex::scan(dir.path()).unwrap();
        assert_eq!(index.classes(), &["cat", "dog"]);
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = tempdir().unwrap();
        assert!(LabelIndex::scan(dir.path()).unwrap_err().is_index_build());
    }
}
