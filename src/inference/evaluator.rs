//! Evaluation routine
//!
//! Runs a network over every batch of a provider without touching its parameters and
//! reports accuracy, mean loss and a confusion matrix.
//!
//! Pass a model on a non-autodiff backend (`model.valid()` for a training model): there
//! dropout is inactive and batch norm uses its running statistics.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::tensor::{backend::Backend, ElementConversion, Int, Tensor};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::BatchProvider;
use crate::model::Network;
use crate::utils::error::{CaltechError, Result};
use crate::utils::metrics::ConfusionMatrix;

/// Outcome of one evaluation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Samples whose arg-max prediction equals the label
    pub correct: usize,
    /// Samples evaluated
    pub total: usize,
    /// `correct / total`, 0 when nothing was evaluated
    pub accuracy: f64,
    /// Sample-weighted mean cross-entropy
    pub mean_loss: f64,
    pub confusion: ConfusionMatrix,
}

impl EvaluationResult {
    /// Macro-averaged F1 over the classes present in the evaluated data
    pub fn macro_f1(&self) -> f64 {
        self.confusion.macro_f1()
    }
}

/// Evaluate `model` over one full pass of `provider`
pub fn evaluate<B: Backend>(
    model: &Network<B>,
    provider: &BatchProvider,
    device: &B::Device,
) -> Result<EvaluationResult> {
    evaluate_with_progress(model, provider, device, false)
}

/// [`evaluate`] with an optional terminal progress bar
pub fn evaluate_with_progress<B: Backend>(
    model: &Network<B>,
    provider: &BatchProvider,
    device: &B::Device,
    show_progress: bool,
) -> Result<EvaluationResult> {
    let criterion = CrossEntropyLossConfig::new().init(device);
    let mut confusion = ConfusionMatrix::new(model.num_classes());
    let mut loss_sum = 0.0f64;
    let mut total = 0usize;

    let progress = if show_progress {
        let bar = ProgressBar::new(provider.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    for batch in provider.batches::<B>(device) {
        let batch = batch?;
        let batch_size = batch.len();
        if batch_size == 0 {
            continue;
        }

        let logits = model.forward(batch.images);
        let loss = criterion.forward(logits.clone(), batch.targets.clone());
        let loss_value: f64 = loss.into_scalar().elem();
        loss_sum += loss_value * batch_size as f64;

        let predictions: Tensor<B, 1, Int> = logits.argmax(1).reshape([batch_size]);
        let predicted = to_labels(predictions)?;
        let actual = to_labels(batch.targets)?;
        confusion.extend(&actual, &predicted);
        total += batch_size;

        progress.inc(1);
    }
    progress.finish_and_clear();

    let correct = confusion.correct();
    let (accuracy, mean_loss) = if total > 0 {
        (correct as f64 / total as f64, loss_sum / total as f64)
    } else {
        (0.0, 0.0)
    };
    debug!("Evaluated {} samples: {} correct", total, correct);

    Ok(EvaluationResult {
        correct,
        total,
        accuracy,
        mean_loss,
        confusion,
    })
}

/// Copy an integer label tensor to host memory
pub(crate) fn to_labels<B: Backend>(tensor: Tensor<B, 1, Int>) -> Result<Vec<usize>> {
    let values = tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| CaltechError::Model(format!("Cannot read label tensor: {:?}", e)))?;
    Ok(values.into_iter().map(|v| v.max(0) as usize).collect())
}
