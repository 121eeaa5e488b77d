//! Error Handling Module
//!
//! Error kinds for dataset indexing, configuration, image I/O and model persistence.
//! Every kind is fatal for a run; the variants exist so callers can tell them apart.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the Caltech fine-tuning pipeline
#[derive(Error, Debug)]
pub enum CaltechError {
    /// Invalid or inconsistent configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Label or sample index could not be built from the dataset directory
    #[error("Index build error: {0}")]
    IndexBuild(String),

    /// Dataset access outside `[0, len)`
    #[error("Index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error saving or loading model records
    #[error("Model error: {0}")]
    Model(String),

    /// A background decode thread died before finishing its pass
    #[error("Worker error: {0}")]
    Worker(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaltechError {
    /// Whether this is a configuration error (raised before any work starts)
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Whether this is an index-build error
    pub fn is_index_build(&self) -> bool {
        matches!(self, Self::IndexBuild(_))
    }

    /// Whether this is a filesystem or image decoding failure
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ImageLoad(..))
    }
}

impl From<serde_json::Error> for CaltechError {
    fn from(err: serde_json::Error) -> Self {
        CaltechError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for CaltechError {
    fn from(err: image::ImageError) -> Self {
        CaltechError::ImageLoad(PathBuf::new(), err.to_string())
    }
}

/// Convenience Result type for the pipeline
pub type Result<T> = std::result::Result<T, CaltechError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CaltechError::IndexBuild("no samples".to_string());
        assert_eq!(format!("{}", err), "Index build error: no samples");
    }

    #[test]
    fn test_image_load_error() {
        let path = PathBuf::from("/data/101_ObjectCategories/cat/image_0001.jpg");
        let err = CaltechError::ImageLoad(path, "unexpected EOF".to_string());
        assert!(format!("{}", err).contains("image_0001.jpg"));
        assert!(err.is_io());
    }

    #[test]
    fn test_kind_predicates() {
        assert!(CaltechError::Config("bad".into()).is_config());
        assert!(CaltechError::IndexBuild("empty".into()).is_index_build());

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "train.txt");
        let err: CaltechError = io_err.into();
        assert!(err.is_io());
        assert!(!err.is_config());
    }

    #[test]
    fn test_json_error_conversion() {
        let parse = serde_json::from_str::<u32>("not a number");
        let err: CaltechError = parse.unwrap_err().into();
        assert!(matches!(err, CaltechError::Serialization(_)));
    }

    #[test]
    fn test_image_error_conversion() {
        let decode = image::load_from_memory(b"definitely not an image");
        let err: CaltechError = decode.unwrap_err().into();
        assert!(err.is_io());
    }
}
