//! Best-checkpoint tracking and persistence
//!
//! The training loop keeps an in-memory snapshot of the model with the highest
//! validation accuracy seen so far. A later epoch that ties the best accuracy replaces
//! the snapshot. When an output directory is configured, the snapshot is written with
//! Burn's `CompactRecorder` next to a JSON metadata file.

use std::fs;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{FreezePolicy, Network, NetworkType};
use crate::utils::error::Result;

/// File stem of the persisted best model
pub const BEST_MODEL_STEM: &str = "best_model";

/// Snapshot of the best model so far
#[derive(Debug, Clone)]
pub struct BestCheckpoint<M> {
    pub model: M,
    /// Zero-based epoch the snapshot was taken after
    pub epoch: usize,
    /// Validation accuracy of the snapshot
    pub accuracy: f64,
}

/// Keeps the [`BestCheckpoint`] across epochs
#[derive(Debug, Clone)]
pub struct BestTracker<M> {
    best: Option<BestCheckpoint<M>>,
}

impl<M> Default for BestTracker<M> {
    fn default() -> Self {
        Self { best: None }
    }
}

impl<M> BestTracker<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer an epoch result; `snapshot` is only called when the epoch becomes the best
    ///
    /// Returns whether the best checkpoint was replaced.
    pub fn observe<F>(&mut self, epoch: usize, accuracy: f64, snapshot: F) -> bool
    where
        F: FnOnce() -> M,
    {
        let replace = match &self.best {
            None => true,
            Some(best) => accuracy >= best.accuracy,
        };

        if replace {
            self.best = Some(BestCheckpoint {
                model: snapshot(),
                epoch,
                accuracy,
            });
        }
        replace
    }

    pub fn best(&self) -> Option<&BestCheckpoint<M>> {
        self.best.as_ref()
    }

    pub fn into_best(self) -> Option<BestCheckpoint<M>> {
        self.best
    }
}

/// Metadata written next to a persisted checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub network: NetworkType,
    pub num_classes: usize,
    pub class_names: Vec<String>,
    pub freeze: FreezePolicy,
    pub epoch: usize,
    pub validation_accuracy: f64,
    pub num_parameters: usize,
    pub timestamp: String,
}

impl CheckpointMetadata {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl<B: Backend> BestCheckpoint<Network<B>> {
    /// Write `best_model.mpk` and `best_model.json` into `dir`
    pub fn save(
        &self,
        dir: &Path,
        network: NetworkType,
        freeze: FreezePolicy,
        class_names: &[String],
    ) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let model_path = dir.join(BEST_MODEL_STEM);
        self.model.save(&model_path)?;

        let metadata = CheckpointMetadata {
            network,
            num_classes: self.model.num_classes(),
            class_names: class_names.to_vec(),
            freeze,
            epoch: self.epoch,
            validation_accuracy: self.accuracy,
            num_parameters: burn::module::Module::num_params(&self.model),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        metadata.save(&model_path.with_extension("json"))?;

        info!(
            "Best checkpoint (epoch {}, accuracy {:.4}) saved to {:?}",
            self.epoch + 1,
            self.accuracy,
            model_path
        );
        Ok(model_path)
    }

    /// Read a checkpoint written by [`BestCheckpoint::save`] from `dir`
    pub fn load(dir: &Path, device: &B::Device) -> Result<(Self, CheckpointMetadata)> {
        let model_path = dir.join(BEST_MODEL_STEM);
        let metadata = CheckpointMetadata::load(&model_path.with_extension("json"))?;
        let model = Network::load(metadata.network, metadata.num_classes, &model_path, device)?;

        Ok((
            Self {
                model,
                epoch: metadata.epoch,
                accuracy: metadata.validation_accuracy,
            },
            metadata,
        ))
    }
}
