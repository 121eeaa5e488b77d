//! Experiment Configuration
//!
//! A single immutable configuration record holds every hyperparameter of a run. It is
//! read from JSON (or built from defaults plus CLI overrides), validated once, and then
//! passed by reference to every component.

use std::ops::Deref;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::{Normalization, Transform};
use crate::model::{FreezePolicy, NetworkType};
use crate::utils::error::{CaltechError, Result};

/// Experiment hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Dataset root holding `101_ObjectCategories`, `train.txt` and `test.txt`
    pub data_dir: PathBuf,

    /// Architecture name: alexnet, vgg, resnet or resnet18
    pub network: String,

    /// Samples per batch; defaults per network when unset
    pub batch_size: Option<usize>,

    /// Initial learning rate
    pub learning_rate: f64,

    /// SGD momentum
    pub momentum: f64,

    /// L2 weight decay
    pub weight_decay: f64,

    pub num_epochs: usize,

    /// Epochs between learning-rate decays
    pub step_size: usize,

    /// Learning-rate decay factor
    pub gamma: f64,

    /// Log the training loss every this many steps
    pub log_frequency: usize,

    /// Start from ImageNet weights
    pub pretrained: bool,

    /// Directory with `<network>_imagenet.mpk` records
    pub weights_dir: PathBuf,

    /// Parameter partition to update: no_freezing, conv_layers or fc_layers
    pub freeze: String,

    /// Fraction of the train manifest used for training; the rest validates
    pub train_fraction: f64,

    pub seed: u64,

    /// Image decode threads per batch provider
    pub num_workers: usize,

    pub resize_size: u32,

    pub crop_size: u32,

    /// Where history, checkpoints and reports are written
    pub output_dir: Option<PathBuf>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("Caltech101"),
            network: "alexnet".to_string(),
            batch_size: None,
            learning_rate: 1e-3,
            momentum: 0.9,
            weight_decay: 5e-5,
            num_epochs: 30,
            step_size: 20,
            gamma: 0.1,
            log_frequency: 10,
            pretrained: true,
            weights_dir: PathBuf::from("weights"),
            freeze: "conv_layers".to_string(),
            train_fraction: 0.5,
            seed: 42,
            num_workers: 4,
            resize_size: crate::RESIZE_SIZE as u32,
            crop_size: crate::IMAGE_SIZE as u32,
            output_dir: None,
        }
    }
}

impl ExperimentConfig {
    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check every value and resolve derived settings
    pub fn validate(self) -> Result<ValidatedConfig> {
        let network: NetworkType = self.network.parse()?;
        let freeze: FreezePolicy = self.freeze.parse()?;
        let batch_size = self.batch_size.unwrap_or_else(|| network.default_batch_size());

        if batch_size == 0 {
            return Err(CaltechError::Config("batch_size must be positive".into()));
        }
        if self.num_epochs == 0 {
            return Err(CaltechError::Config("num_epochs must be positive".into()));
        }
        if self.step_size == 0 {
            return Err(CaltechError::Config("step_size must be positive".into()));
        }
        if self.log_frequency == 0 {
            return Err(CaltechError::Config("log_frequency must be positive".into()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(CaltechError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.gamma > 0.0) {
            return Err(CaltechError::Config(format!(
                "gamma must be positive, got {}",
                self.gamma
            )));
        }
        if self.momentum < 0.0 || self.weight_decay < 0.0 {
            return Err(CaltechError::Config(
                "momentum and weight_decay must be non-negative".into(),
            ));
        }
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(CaltechError::Config(format!(
                "train_fraction must be in (0, 1), got {}",
                self.train_fraction
            )));
        }
        // Checks crop against resize
        let transform = Transform::new(
            self.resize_size,
            self.crop_size,
            Normalization::for_pretrained(self.pretrained),
        )?;

        Ok(ValidatedConfig {
            experiment: self,
            network,
            freeze,
            batch_size,
            transform,
        })
    }
}

/// Configuration that passed validation, with parsed and derived values
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub experiment: ExperimentConfig,
    pub network: NetworkType,
    pub freeze: FreezePolicy,
    /// Effective batch size
    pub batch_size: usize,
    /// Transform pipeline shared by every split
    pub transform: Transform,
}

impl ValidatedConfig {
    /// Path of the ImageNet record for the configured network
    pub fn pretrained_weights_path(&self) -> PathBuf {
        self.experiment.weights_dir.join(self.network.weights_file_stem())
    }
}

impl Deref for ValidatedConfig {
    type Target = ExperimentConfig;

    fn deref(&self) -> &Self::Target {
        &self.experiment
    }
}
