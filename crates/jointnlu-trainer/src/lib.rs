//! # JointNLU Trainer
//!
//! Training loop, evaluation and the inference demo for the joint intent +
//! entity model in `jointnlu-core`.

pub mod adversarial;
pub mod config;
pub mod data;
pub mod inference;
pub mod trainer;

pub use config::TrainingConfig;
pub use data::Dataset;
pub use inference::{EntityMention, Interpretation, interpret, run_demo};
pub use trainer::Trainer;

/// Build a trainer from `config`, run every epoch and report the best score.
pub fn run_training(config: TrainingConfig) -> anyhow::Result<f64> {
    let (mut trainer, train, valid) = Trainer::from_config(config)?;
    let best = trainer.fit(&train, &valid)?;
    tracing::info!(best, "training finished");
    Ok(best)
}
