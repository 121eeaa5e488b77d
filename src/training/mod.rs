//! Training module
//!
//! This module provides:
//! - The SGD training loop with per-partition freezing ([`Trainer`])
//! - The step learning-rate schedule ([`StepLR`])
//! - Best-checkpoint tracking and persistence ([`BestCheckpoint`])
//! - The end-to-end experiment driver ([`run_experiment`])
//! - Per-epoch training history

pub mod checkpoint;
pub mod scheduler;
pub mod supervised;
pub mod trainer;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

// Re-export main types for convenience
pub use checkpoint::{BestCheckpoint, BestTracker, CheckpointMetadata, BEST_MODEL_STEM};
pub use scheduler::StepLR;
pub use supervised::{run_experiment, ExperimentReport};
pub use trainer::{EpochMetrics, Trainer, TrainerConfig, TrainingPhase, TrainingSummary};

/// File name of the serialised history inside the output directory
pub const HISTORY_FILE: &str = "history.json";

/// Metrics of one completed epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// Zero-based epoch index
    pub epoch: usize,
    /// Learning rate the epoch trained with
    pub learning_rate: f64,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

/// Per-epoch record of a training run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
