//! `jointnlu` - train the joint model, or decode one utterance with the
//! best checkpoint.
//!
//! ```bash
//! # Train with defaults (or a JSON config)
//! jointnlu train --config train.json
//!
//! # Decode the demo utterance
//! jointnlu --text "导航去新浪总部"
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use jointnlu_trainer::{TrainingConfig, run_demo, run_training};
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "jointnlu", version, about = "Joint intent classification and entity extraction")]
struct Cli {
    /// JSON training configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// YAML corpus (overrides the config file)
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    /// Pretrained encoder directory
    #[arg(long, global = true)]
    encoder_dir: Option<PathBuf>,

    /// Checkpoint to write (train) or read (demo)
    #[arg(long, global = true)]
    checkpoint: Option<PathBuf>,

    /// Utterance to decode when not training
    #[arg(long)]
    text: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the training loop
    Train {
        #[arg(long)]
        epochs: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Disable FGM adversarial training
        #[arg(long)]
        no_adversarial: bool,
    },
}

impl Cli {
    fn training_config(&self) -> anyhow::Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::from_file(path)?,
            None => TrainingConfig::default(),
        };
        if let Some(corpus) = &self.corpus {
            config.corpus_path = corpus.clone();
        }
        if let Some(dir) = &self.encoder_dir {
            config.encoder_dir = dir.clone();
        }
        if let Some(checkpoint) = &self.checkpoint {
            config.checkpoint_path = checkpoint.clone();
        }
        if let Some(Command::Train {
            epochs,
            batch_size,
            no_adversarial,
        }) = &self.command
        {
            if let Some(epochs) = epochs {
                config.epochs = *epochs;
            }
            if let Some(batch_size) = batch_size {
                config.batch_size = *batch_size;
            }
            if *no_adversarial {
                config.adversarial = false;
            }
        }
        config.validate()?;
        Ok(config)
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.training_config()?;
    match cli.command {
        Some(Command::Train { .. }) => run_training(config).map(|_| ()),
        None => run_demo(config, cli.text),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
