//! Supervised fine-tuning run
//!
//! Wires the pipeline together: label and sample indexing, the stratified split, the
//! batch providers, network construction, the training loop, and the final validation
//! and test evaluations of the best checkpoint.

use burn::tensor::backend::AutodiffBackend;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::trainer::{Trainer, TrainerConfig};
use super::{TrainingHistory, HISTORY_FILE};
use crate::config::ValidatedConfig;
use crate::dataset::{
    BatchProvider, BatchProviderConfig, CaltechBurnDataset, CaltechDataset, DatasetStats,
    LabelIndex, Split, StratifiedSplit,
};
use crate::inference::{evaluate, evaluate_with_progress};
use crate::model::{Network, NetworkType};
use crate::utils::error::{CaltechError, Result};
use crate::utils::format_duration;

/// Dropout of the AlexNet / VGG classifier heads
const CLASSIFIER_DROPOUT: f64 = 0.5;

/// Final numbers of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub network: NetworkType,
    pub num_classes: usize,
    pub train_samples: usize,
    pub val_samples: usize,
    pub test_samples: usize,
    /// Zero-based epoch of the best checkpoint
    pub best_epoch: usize,
    pub val_accuracy: f64,
    pub test_accuracy: f64,
    pub test_macro_f1: f64,
    pub elapsed_minutes: f64,
    pub history: TrainingHistory,
}

/// Run one complete experiment on `device`
pub fn run_experiment<B: AutodiffBackend>(
    config: &ValidatedConfig,
    device: &B::Device,
) -> Result<ExperimentReport> {
    println!("{}", "Initializing Training...".green().bold());
    println!("  Device: {:?}", device);

    // Load the dataset
    println!("{}", "Loading Dataset...".cyan());
    let labels = LabelIndex::scan(&config.data_dir)?;
    let train_set = CaltechDataset::with_labels(&config.data_dir, Split::Train, labels.clone())?;
    let test_set = CaltechDataset::with_labels(&config.data_dir, Split::Test, labels.clone())?;

    let all_samples: Vec<_> = train_set
        .samples
        .iter()
        .chain(&test_set.samples)
        .cloned()
        .collect();
    DatasetStats::from_samples(&labels, &all_samples).print();

    println!("{}", "Creating Stratified Data Splits...".cyan());
    let targets = train_set.targets();
    let split = StratifiedSplit::new(&targets, config.train_fraction, config.seed)?;
    print!("{}", split.stats(&targets));

    let full_train = CaltechBurnDataset::from_dataset(&train_set, config.transform);
    let train_provider = BatchProvider::new(
        full_train.subset(&split.train)?,
        BatchProviderConfig::train(config.batch_size, config.num_workers, config.seed),
    )?;
    let val_provider = BatchProvider::new(
        full_train.subset(&split.val)?,
        BatchProviderConfig::eval(config.batch_size, config.num_workers),
    )?;
    let test_provider = BatchProvider::new(
        CaltechBurnDataset::from_dataset(&test_set, config.transform),
        BatchProviderConfig::eval(config.batch_size, config.num_workers),
    )?;

    if train_provider.is_empty() {
        return Err(CaltechError::Config(format!(
            "Not enough training samples ({}) for batch size {}",
            train_provider.num_items(),
            config.batch_size
        )));
    }

    println!();
    println!("{}", "Creating Model...".cyan());
    let num_classes = labels.len();
    let model = if config.pretrained {
        Network::<B>::pretrained(
            config.network,
            num_classes,
            CLASSIFIER_DROPOUT,
            config.pretrained_weights_path(),
            device,
        )?
    } else {
        Network::<B>::new(config.network, num_classes, CLASSIFIER_DROPOUT, device)
    };

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  🧠 Network:            {}", config.network);
    println!("  🏷️  Training samples:   {}", train_provider.num_items());
    println!("  ✅ Validation samples: {}", val_provider.num_items());
    println!("  🧪 Test samples:       {}", test_provider.num_items());
    println!("  🔄 Epochs:             {}", config.num_epochs);
    println!("  📦 Batch size:         {}", config.batch_size);
    println!("  📈 Learning rate:      {}", config.learning_rate);
    println!("  🧊 Freeze:             {}", config.freeze);
    println!();

    println!("{}", "Starting Training...".green().bold());
    let mut trainer = Trainer::new(model, TrainerConfig::from(config), device.clone())?;
    let summary = trainer.fit(&train_provider, &val_provider)?;
    let history = trainer.history().clone();
    let best = trainer
        .into_best()
        .ok_or_else(|| CaltechError::Model("Training produced no checkpoint".to_string()))?;

    println!();
    println!("{}", "Evaluating Best Checkpoint...".cyan());
    let validation = evaluate(&best.model, &val_provider, device)?;
    info!("Validation Accuracy: {:.4}", validation.accuracy);
    let test = evaluate_with_progress(&best.model, &test_provider, device, true)?;
    info!("Test Accuracy: {:.4}", test.accuracy);

    if let Some(output_dir) = &config.output_dir {
        std::fs::create_dir_all(output_dir)?;
        history.save(&output_dir.join(HISTORY_FILE))?;
        config.experiment.save(output_dir.join("config.json"))?;
        let path = best.save(output_dir, config.network, config.freeze, labels.classes())?;
        println!("  💾 Saved to: {:?}", path);
    }

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!(
        "  🎉 Best epoch: {} (validation accuracy {:.2}%)",
        best.epoch + 1,
        100.0 * validation.accuracy
    );
    println!("  🧪 Test accuracy:  {:.2}%", 100.0 * test.accuracy);
    println!("  📐 Test macro F1:  {:.4}", test.macro_f1());
    println!(
        "  ⏱️  Elapsed:        {}",
        format_duration(summary.elapsed_minutes * 60.0)
    );

    Ok(ExperimentReport {
        network: config.network,
        num_classes,
        train_samples: train_provider.num_items(),
        val_samples: val_provider.num_items(),
        test_samples: test_provider.num_items(),
        best_epoch: best.epoch,
        val_accuracy: validation.accuracy,
        test_accuracy: test.accuracy,
        test_macro_f1: test.macro_f1(),
        elapsed_minutes: summary.elapsed_minutes,
        history,
    })
}
