//! # Caltech-101 Fine-Tuning
//!
//! Fine-tunes ImageNet-style convolutional classifiers (AlexNet, VGG-16, ResNet) on the
//! Caltech-101 dataset using the Burn framework.
//!
//! ## Modules
//!
//! - `dataset`: label/sample indexing from split manifests, image transforms, the
//!   stratified train/validation partitioner and the prefetching batch provider
//! - `model`: network architectures with a convolutional / fully-connected partition
//! - `training`: SGD training loop, step learning-rate schedule, best checkpoint tracking
//! - `inference`: frozen-parameter evaluation over a batch provider
//! - `utils`: errors, logging, metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use caltech_finetune::{CaltechDataset, ExperimentConfig, Split};
//!
//! let config = ExperimentConfig::default().validate()?;
//! let train = CaltechDataset::new(&config.data_dir, Split::Train)?;
//! println!("{} training samples", train.len());
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::{ExperimentConfig, ValidatedConfig};
pub use dataset::{
    BatchProvider, CaltechBatch, CaltechBatcher, CaltechBurnDataset, CaltechDataset, CaltechItem,
    LabelIndex, Sample, Split, StratifiedSplit, Transform,
};
pub use inference::{evaluate, EvaluationResult};
pub use model::{FreezePolicy, Network, NetworkType};
pub use training::{run_experiment, BestCheckpoint, StepLR, Trainer, TrainingHistory};
pub use utils::error::{CaltechError, Result};

/// Side length of the square network input after center cropping
pub const IMAGE_SIZE: usize = 224;

/// Target short-side length before center cropping
pub const RESIZE_SIZE: usize = 256;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
