//! Training loop
//!
//! A [`Trainer`] owns the model, the SGD optimizer and the step schedule, and moves
//! through `Initializing -> (TrainingEpoch -> ValidatingEpoch)* -> Done`. After each
//! validation pass the best checkpoint is updated (ties go to the later epoch) and the
//! learning-rate schedule advances by one epoch. Any error aborts the run and leaves
//! the phase where it failed.

use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{
        adaptor::OptimizerAdaptor, decay::WeightDecayConfig, momentum::MomentumConfig, Optimizer,
        Sgd, SgdConfig,
    },
    tensor::{backend::AutodiffBackend, ElementConversion, Int, Tensor},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::checkpoint::{BestCheckpoint, BestTracker};
use super::scheduler::StepLR;
use super::{EpochRecord, TrainingHistory};
use crate::config::ValidatedConfig;
use crate::dataset::BatchProvider;
use crate::inference::{evaluate, EvaluationResult};
use crate::model::{FreezePolicy, Network};
use crate::utils::error::{CaltechError, Result};
use crate::utils::logging::TrainingLogger;

/// Optimisation settings of a [`Trainer`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub num_epochs: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub step_size: usize,
    pub gamma: f64,
    /// Log the batch loss every this many optimizer steps
    pub log_frequency: usize,
    pub freeze: FreezePolicy,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            num_epochs: 30,
            learning_rate: 1e-3,
            momentum: 0.9,
            weight_decay: 5e-5,
            step_size: 20,
            gamma: 0.1,
            log_frequency: 10,
            freeze: FreezePolicy::ConvLayers,
        }
    }
}

impl From<&ValidatedConfig> for TrainerConfig {
    fn from(config: &ValidatedConfig) -> Self {
        Self {
            num_epochs: config.num_epochs,
            learning_rate: config.learning_rate,
            momentum: config.momentum,
            weight_decay: config.weight_decay,
            step_size: config.step_size,
            gamma: config.gamma,
            log_frequency: config.log_frequency,
            freeze: config.freeze,
        }
    }
}

/// Where the training loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    Initializing,
    TrainingEpoch(usize),
    ValidatingEpoch(usize),
    Done,
}

/// Loss and accuracy over one training pass
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Sample-weighted mean batch loss
    pub loss: f64,
    pub accuracy: f64,
    pub samples: usize,
    pub steps: usize,
}

/// Result of a completed [`Trainer::fit`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// Zero-based epoch of the best checkpoint
    pub best_epoch: usize,
    pub best_accuracy: f64,
    pub elapsed_minutes: f64,
}

type SgdOptimizer<B> =
    OptimizerAdaptor<Sgd<<B as AutodiffBackend>::InnerBackend>, Network<B>, B>;

/// SGD training loop over a [`Network`]
pub struct Trainer<B: AutodiffBackend> {
    model: Network<B>,
    optimizer: SgdOptimizer<B>,
    scheduler: StepLR,
    config: TrainerConfig,
    device: B::Device,
    phase: TrainingPhase,
    global_step: usize,
    best: BestTracker<Network<B::InnerBackend>>,
    history: TrainingHistory,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Prepare a trainer; the model is moved to `device`
    pub fn new(model: Network<B>, config: TrainerConfig, device: B::Device) -> Result<Self> {
        if config.num_epochs == 0 || config.log_frequency == 0 {
            return Err(CaltechError::Config(
                "num_epochs and log_frequency must be positive".to_string(),
            ));
        }

        let model = burn::module::Module::fork(model, &device);
        let momentum = (config.momentum > 0.0).then(|| {
            MomentumConfig::new()
                .with_momentum(config.momentum)
                .with_dampening(0.0)
        });
        let weight_decay =
            (config.weight_decay > 0.0).then(|| WeightDecayConfig::new(config.weight_decay as f32));
        let optimizer = SgdConfig::new()
            .with_momentum(momentum)
            .with_weight_decay(weight_decay)
            .init();
        let scheduler = StepLR::new(config.learning_rate, config.step_size, config.gamma);

        info!(
            "Trainer ready: {} epochs, {} of {} parameters trainable ({})",
            config.num_epochs,
            model.trainable_params(config.freeze),
            burn::module::Module::num_params(&model),
            config.freeze
        );

        Ok(Self {
            model,
            optimizer,
            scheduler,
            config,
            device,
            phase: TrainingPhase::Initializing,
            global_step: 0,
            best: BestTracker::new(),
            history: TrainingHistory::default(),
        })
    }

    pub fn phase(&self) -> TrainingPhase {
        self.phase
    }

    pub fn model(&self) -> &Network<B> {
        &self.model
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    pub fn best(&self) -> Option<&BestCheckpoint<Network<B::InnerBackend>>> {
        self.best.best()
    }

    /// Learning rate the next epoch trains with
    pub fn learning_rate(&self) -> f64 {
        self.scheduler.get_lr()
    }

    /// Optimizer steps taken so far
    pub fn global_step(&self) -> usize {
        self.global_step
    }

    /// Run every epoch, validating after each
    pub fn fit(&mut self, train: &BatchProvider, val: &BatchProvider) -> Result<TrainingSummary> {
        let mut logger = TrainingLogger::new(self.config.num_epochs);

        for epoch in 0..self.config.num_epochs {
            logger.start_epoch(epoch, self.scheduler.get_lr());

            self.phase = TrainingPhase::TrainingEpoch(epoch);
            let train_metrics = self.train_epoch(train)?;

            self.phase = TrainingPhase::ValidatingEpoch(epoch);
            let validation = self.validate(val)?;
            logger.end_epoch(
                train_metrics.loss,
                train_metrics.accuracy,
                validation.mean_loss,
                validation.accuracy,
            );

            let model = &self.model;
            if self.best.observe(epoch, validation.accuracy, || model.valid()) {
                logger.log_new_best(validation.accuracy);
            }

            self.history.epochs.push(EpochRecord {
                epoch,
                learning_rate: self.scheduler.get_lr(),
                train_loss: train_metrics.loss,
                train_accuracy: train_metrics.accuracy,
                val_loss: validation.mean_loss,
                val_accuracy: validation.accuracy,
            });
            self.scheduler.step();
        }

        self.phase = TrainingPhase::Done;

        let (best_epoch, best_accuracy) = self
            .best
            .best()
            .map(|b| (b.epoch, b.accuracy))
            .unwrap_or((0, 0.0));
        info!(
            "Best epoch: {} (validation accuracy {:.4})",
            best_epoch + 1,
            best_accuracy
        );

        Ok(TrainingSummary {
            best_epoch,
            best_accuracy,
            elapsed_minutes: logger.elapsed_minutes(),
        })
    }

    /// One pass over `train` with an optimizer step per batch
    ///
    /// Loss and accuracy are accumulated over every batch of the pass.
    pub fn train_epoch(&mut self, train: &BatchProvider) -> Result<EpochMetrics> {
        let lr = self.scheduler.get_lr();
        let criterion = CrossEntropyLossConfig::new().init(&self.device);

        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;
        let mut samples = 0usize;
        let mut steps = 0usize;

        for batch in train.batches::<B>(&self.device) {
            let batch = batch?;
            let batch_size = batch.len();
            if batch_size == 0 {
                continue;
            }

            let logits = self.model.forward(batch.images);
            let loss = criterion.forward(logits.clone(), batch.targets.clone());
            let loss_value: f64 = loss.clone().into_scalar().elem();

            if self.global_step % self.config.log_frequency == 0 {
                info!("Step {}, Loss {}", self.global_step, loss_value);
            }

            let predictions: Tensor<B, 1, Int> = logits.argmax(1).reshape([batch_size]);
            let batch_correct: i64 = predictions
                .equal(batch.targets)
                .int()
                .sum()
                .into_scalar()
                .elem();

            // Gradients are fresh per backward pass; only the trainable partition is stepped
            let grads = loss.backward();
            let grads = self.model.trainable_gradients(grads, self.config.freeze);
            self.model = self.optimizer.step(lr, self.model.clone(), grads);

            loss_sum += loss_value * batch_size as f64;
            correct += batch_correct.max(0) as usize;
            samples += batch_size;
            steps += 1;
            self.global_step += 1;
        }

        let (loss, accuracy) = if samples > 0 {
            (loss_sum / samples as f64, correct as f64 / samples as f64)
        } else {
            (0.0, 0.0)
        };

        Ok(EpochMetrics {
            loss,
            accuracy,
            samples,
            steps,
        })
    }

    /// Evaluate the current model in evaluation mode
    pub fn validate(&self, val: &BatchProvider) -> Result<EvaluationResult> {
        let model = self.model.valid();
        evaluate(&model, val, &self.device)
    }

    /// Hand out the best checkpoint, consuming the trainer
    pub fn into_best(self) -> Option<BestCheckpoint<Network<B::InnerBackend>>> {
        self.best.into_best()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{BatchProviderConfig, CaltechBurnDataset, Normalization, Sample, Transform};
    use crate::model::NetworkType;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn tiny_provider(dir: &TempDir, n: usize, train: bool) -> BatchProvider {
        let samples: Vec<Sample> = (0..n)
            .map(|i| {
                let path = dir.path().join(format!("{}_{}.png", train, i));
                let shade = if i % 2 == 0 { 20 } else { 230 };
                RgbImage::from_pixel(40, 36, Rgb([shade, shade, 128]))
                    .save(&path)
                    .unwrap();
                Sample { path, label: i % 2 }
            })
            .collect();
        let transform = Transform::new(36, 32, Normalization::Centered).unwrap();
        let config = if train {
            BatchProviderConfig::train(2, 0, 7)
        } else {
            BatchProviderConfig::eval(2, 0)
        };
        BatchProvider::new(CaltechBurnDataset::new(samples, transform), config).unwrap()
    }

    fn tiny_config(num_epochs: usize) -> TrainerConfig {
        TrainerConfig {
            num_epochs,
            learning_rate: 1e-3,
            step_size: 1,
            gamma: 0.5,
            log_frequency: 1,
            ..TrainerConfig::default()
        }
    }

    #[test]
    fn test_rejects_zero_epochs() {
        let device = Default::default();
        let model = Network::<TestBackend>::new(NetworkType::ResNet18, 2, 0.5, &device);
        assert!(Trainer::new(model, tiny_config(0), device).is_err());
    }

    #[test]
    fn test_default_trains_classifier_only() {
        let config = TrainerConfig::default();
        assert_eq!(config.freeze, FreezePolicy::ConvLayers);
        assert_eq!(config.num_epochs, 30);
    }

    #[test]
    fn test_fit_runs_to_done() {
        let dir = TempDir::new().unwrap();
        let train = tiny_provider(&dir, 4, true);
        let val = tiny_provider(&dir, 2, false);

        let device = Default::default();
        let model = Network::<TestBackend>::new(NetworkType::ResNet18, 2, 0.5, &device);
        let mut trainer = Trainer::new(model, tiny_config(2), device).unwrap();
        assert_eq!(trainer.phase(), TrainingPhase::Initializing);

        let summary = trainer.fit(&train, &val).unwrap();

        assert_eq!(trainer.phase(), TrainingPhase::Done);
        assert_eq!(trainer.global_step(), 4);
        assert_eq!(trainer.history().epochs.len(), 2);
        assert!((trainer.history().epochs[0].learning_rate - 1e-3).abs() < 1e-12);
        assert!((trainer.history().epochs[1].learning_rate - 5e-4).abs() < 1e-12);
        assert!((trainer.learning_rate() - 2.5e-4).abs() < 1e-12);
        assert!(summary.best_epoch < 2);
        assert!((0.0..=1.0).contains(&summary.best_accuracy));

        let best = trainer.into_best().unwrap();
        assert_eq!(best.model.num_classes(), 2);
    }

    #[test]
    fn test_train_epoch_counts_every_batch() {
        let dir = TempDir::new().unwrap();
        let train = tiny_provider(&dir, 5, true);

        let device = Default::default();
        let model = Network::<TestBackend>::new(NetworkType::ResNet18, 2, 0.5, &device);
        let mut trainer = Trainer::new(model, tiny_config(1), device).unwrap();

        // 5 samples with batch size 2 and drop_last keep two full batches
        let metrics = trainer.train_epoch(&train).unwrap();
        assert_eq!(metrics.steps, 2);
        assert_eq!(metrics.samples, 4);
        assert!(metrics.loss.is_finite() && metrics.loss > 0.0);
        assert!((0.0..=1.0).contains(&metrics.accuracy));
    }

    #[test]
    fn test_decode_error_aborts_fit() {
        let dir = TempDir::new().unwrap();
        let val = tiny_provider(&dir, 2, false);
        let broken = BatchProvider::new(
            CaltechBurnDataset::new(
                vec![
                    Sample { path: "/missing/a.png".into(), label: 0 },
                    Sample { path: "/missing/b.png".into(), label: 1 },
                ],
                Transform::new(36, 32, Normalization::Centered).unwrap(),
            ),
            BatchProviderConfig::train(2, 0, 1),
        )
        .unwrap();

        let device = Default::default();
        let model = Network::<TestBackend>::new(NetworkType::ResNet18, 2, 0.5, &device);
        let mut trainer = Trainer::new(model, tiny_config(2), device).unwrap();

        assert!(trainer.fit(&broken, &val).is_err());
        assert_eq!(trainer.phase(), TrainingPhase::TrainingEpoch(0));
        assert!(trainer.best().is_none());
    }
}
