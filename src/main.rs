//! Caltech-101 Fine-Tuning CLI
//!
//! Entry point for training, evaluating and inspecting AlexNet / VGG / ResNet
//! classifiers on Caltech-101 with the Burn framework.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use caltech_finetune::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use caltech_finetune::dataset::{
    BatchProvider, BatchProviderConfig, CaltechBurnDataset, CaltechDataset, DatasetStats,
    LabelIndex, Split, StratifiedSplit, BACKGROUND_CLASS,
};
use caltech_finetune::inference::evaluate_with_progress;
use caltech_finetune::training::{run_experiment, BestCheckpoint};
use caltech_finetune::utils::logging::{init_logging, LogConfig, LogLevel};
use caltech_finetune::{ExperimentConfig, Network};

/// Caltech-101 Fine-Tuning
///
/// Fine-tunes ImageNet-style convolutional classifiers on Caltech-101 with a
/// stratified train/validation split, SGD and a step learning-rate schedule.
#[derive(Parser, Debug)]
#[command(name = "caltech_finetune")]
#[command(version)]
#[command(about = "Fine-tune AlexNet / VGG / ResNet on Caltech-101 with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false")]
    quiet: bool,

    /// Explicit log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fine-tune a network and report validation / test accuracy
    Train(TrainArgs),

    /// Score a saved best checkpoint on a split
    Evaluate {
        /// Directory holding best_model.mpk / best_model.json
        #[arg(short, long)]
        checkpoint_dir: PathBuf,

        /// Path to the Caltech-101 root directory
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Split to evaluate (train or test)
        #[arg(short, long, default_value = "test")]
        split: String,

        /// Batch size for evaluation
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Decode worker threads
        #[arg(long, default_value = "4")]
        num_workers: usize,
    },

    /// Show dataset statistics
    Stats {
        /// Path to the Caltech-101 root directory
        #[arg(short, long, default_value = "data/caltech101")]
        data_dir: PathBuf,

        /// Also show the train/validation split sizes
        #[arg(long, default_value = "false")]
        show_split: bool,

        /// Train fraction of the split
        #[arg(long, default_value = "0.5")]
        train_fraction: f64,

        /// Random seed of the split
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Write the default configuration as JSON
    InitConfig {
        /// Output file
        #[arg(short, long, default_value = "caltech.json")]
        output: PathBuf,
    },
}

/// Options of the `train` subcommand; each one overrides the configuration file
#[derive(Args, Debug)]
struct TrainArgs {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the Caltech-101 root directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Network architecture (alexnet, vgg, resnet, resnet18)
    #[arg(short, long)]
    network: Option<String>,

    /// Batch size (defaults per network)
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Initial learning rate
    #[arg(short, long)]
    learning_rate: Option<f64>,

    /// SGD momentum
    #[arg(long)]
    momentum: Option<f64>,

    /// Weight decay
    #[arg(long)]
    weight_decay: Option<f64>,

    /// Number of training epochs
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Epochs between learning-rate decays
    #[arg(long)]
    step_size: Option<usize>,

    /// Learning-rate decay factor
    #[arg(long)]
    gamma: Option<f64>,

    /// Which layers to freeze (no_freezing, conv_layers, fc_layers)
    #[arg(long)]
    freeze: Option<String>,

    /// Train from random initialisation instead of ImageNet weights
    #[arg(long, default_value = "false")]
    from_scratch: bool,

    /// Directory of `<network>_imagenet.mpk` records
    #[arg(long)]
    weights_dir: Option<PathBuf>,

    /// Fraction of the train split used for training
    #[arg(long)]
    train_fraction: Option<f64>,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Decode worker threads
    #[arg(long)]
    num_workers: Option<usize>,

    /// Output directory for the checkpoint and history
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

impl TrainArgs {
    fn into_config(self) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::load(path)
                .with_context(|| format!("Failed to read configuration {:?}", path))?,
            None => ExperimentConfig::default(),
        };

        if let Some(v) = self.data_dir {
            config.data_dir = v;
        }
        if let Some(v) = self.network {
            config.network = v;
        }
        if self.batch_size.is_some() {
            config.batch_size = self.batch_size;
        }
        if let Some(v) = self.learning_rate {
            config.learning_rate = v;
        }
        if let Some(v) = self.momentum {
            config.momentum = v;
        }
        if let Some(v) = self.weight_decay {
            config.weight_decay = v;
        }
        if let Some(v) = self.epochs {
            config.num_epochs = v;
        }
        if let Some(v) = self.step_size {
            config.step_size = v;
        }
        if let Some(v) = self.gamma {
            config.gamma = v;
        }
        if let Some(v) = self.freeze {
            config.freeze = v;
        }
        if self.from_scratch {
            config.pretrained = false;
        }
        if let Some(v) = self.weights_dir {
            config.weights_dir = v;
        }
        if let Some(v) = self.train_fraction {
            config.train_fraction = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.num_workers {
            config.num_workers = v;
        }
        if self.output_dir.is_some() {
            config.output_dir = self.output_dir;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };
    if let Some(level) = &cli.log_level {
        log_config.level = LogLevel::parse(level);
    }

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train(args) => {
            cmd_train(args)?;
        }

        Commands::Evaluate {
            checkpoint_dir,
            data_dir,
            split,
            batch_size,
            num_workers,
        } => {
            cmd_evaluate(&checkpoint_dir, data_dir, &split, batch_size, num_workers)?;
        }

        Commands::Stats {
            data_dir,
            show_split,
            train_fraction,
            seed,
        } => {
            cmd_stats(&data_dir, show_split, train_fraction, seed)?;
        }

        Commands::InitConfig { output } => {
            ExperimentConfig::default().save(&output)?;
            println!("{} Default configuration written to {:?}", "✓".green(), output);
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        format!(
            "\n  Caltech-101 Fine-Tuning v{} ({})\n",
            caltech_finetune::VERSION,
            backend_name()
        )
        .green()
        .bold()
    );
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    // Any invalid value stops the run before the dataset is touched
    let config = args
        .into_config()?
        .validate()
        .context("Invalid configuration")?;

    info!("Training {} on {:?}", config.network, config.data_dir);

    let device = default_device();
    let report = run_experiment::<TrainingBackend>(&config, &device)?;

    if let Some(output_dir) = &config.output_dir {
        let path = output_dir.join("report.json");
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        println!("  📄 Report: {:?}", path);
    }

    Ok(())
}

fn cmd_evaluate(
    checkpoint_dir: &Path,
    data_dir: Option<PathBuf>,
    split: &str,
    batch_size: Option<usize>,
    num_workers: usize,
) -> Result<()> {
    let split: Split = split.parse()?;

    // The run's own configuration fixes the transform; fall back to the defaults
    let config_path = checkpoint_dir.join("config.json");
    let mut config = if config_path.exists() {
        ExperimentConfig::load(&config_path)?
    } else {
        ExperimentConfig::default()
    };
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    config.num_workers = num_workers;
    let config = config.validate().context("Invalid configuration")?;

    let device = default_device();
    let (checkpoint, metadata) =
        BestCheckpoint::<Network<DefaultBackend>>::load(checkpoint_dir, &device)
            .with_context(|| format!("Failed to load checkpoint from {:?}", checkpoint_dir))?;

    println!("{}", "Checkpoint:".cyan().bold());
    println!("  🧠 Network:             {}", metadata.network);
    println!("  🏷️  Classes:             {}", metadata.num_classes);
    println!("  🔄 Epoch:               {}", metadata.epoch + 1);
    println!(
        "  ✅ Validation accuracy: {:.2}%",
        100.0 * metadata.validation_accuracy
    );
    println!();

    // Saved names exclude the background class the index builder expects
    let names = metadata
        .class_names
        .iter()
        .cloned()
        .chain(std::iter::once(BACKGROUND_CLASS.to_string()));
    let labels = LabelIndex::from_names(names)?;
    let dataset = CaltechDataset::with_labels(&config.data_dir, split, labels)?;
    let provider = BatchProvider::new(
        CaltechBurnDataset::from_dataset(&dataset, config.transform),
        BatchProviderConfig::eval(
            batch_size.unwrap_or(config.batch_size),
            config.num_workers,
        ),
    )?;

    println!("{}", format!("Evaluating on {} split...", split).cyan());
    let result = evaluate_with_progress(&checkpoint.model, &provider, &device, true)?;

    println!();
    println!("{}", "Results:".green().bold());
    println!("  Samples:   {}", result.total);
    println!("  Correct:   {}", result.correct);
    println!("  Accuracy:  {:.2}%", 100.0 * result.accuracy);
    println!("  Mean loss: {:.4}", result.mean_loss);
    println!("  Macro F1:  {:.4}", result.macro_f1());

    Ok(())
}

fn cmd_stats(data_dir: &Path, show_split: bool, train_fraction: f64, seed: u64) -> Result<()> {
    info!("Computing dataset statistics for: {:?}", data_dir);

    if !data_dir.exists() {
        println!(
            "{} Dataset directory not found: {:?}",
            "Error:".red(),
            data_dir
        );
        println!();
        println!("{}", "Expected structure:".yellow());
        println!("  {:?}/", data_dir);
        println!("  ├── 101_ObjectCategories/");
        println!("  │   ├── accordion/");
        println!("  │   ├── ...");
        println!("  │   └── BACKGROUND_Google/");
        println!("  ├── train.txt");
        println!("  └── test.txt");
        anyhow::bail!("Dataset directory not found: {:?}", data_dir);
    }

    let labels = LabelIndex::scan(data_dir)?;
    let train = CaltechDataset::with_labels(data_dir, Split::Train, labels.clone())?;
    let test = CaltechDataset::with_labels(data_dir, Split::Test, labels.clone())?;

    let all: Vec<_> = train.samples.iter().chain(&test.samples).cloned().collect();
    let stats = DatasetStats::from_samples(&labels, &all);
    stats.print();

    println!();
    println!("  Train manifest: {} samples", train.len());
    println!("  Test manifest:  {} samples", test.len());

    let empty = stats.empty_classes();
    if !empty.is_empty() {
        println!(
            "  {} classes without samples: {}",
            "Warning:".yellow(),
            empty.join(", ")
        );
    }

    if show_split {
        let targets = train.targets();
        let split = StratifiedSplit::new(&targets, train_fraction, seed)?;
        println!();
        print!("{}", split.stats(&targets));
    }

    Ok(())
}
