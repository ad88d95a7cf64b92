//! Training and inference settings.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

/// Every knob of a training run. Missing fields in a config file take the
/// [`Default`] values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// YAML corpus the vocabularies and training split are built from.
    pub corpus_path: PathBuf,
    /// Validation corpus; the training corpus is reused when unset.
    pub validation_path: Option<PathBuf>,
    /// Directory with `config.json`, `vocab.txt` or `tokenizer.json`, and
    /// optionally `model.safetensors`.
    pub encoder_dir: PathBuf,
    /// Where the best model is written and read back for inference.
    pub checkpoint_path: PathBuf,
    pub max_len: usize,
    pub batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: u64,
    pub dropout: f32,
    /// Enable FGM adversarial training on the word embeddings.
    pub adversarial: bool,
    pub fgm_epsilon: f64,
    /// Utterance decoded by the inference demo.
    pub demo_text: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from("data/auto_instructions.yml"),
            validation_path: None,
            encoder_dir: PathBuf::from("chinese_L-12_H-768_A-12"),
            checkpoint_path: PathBuf::from("result/best_model.safetensors"),
            max_len: 256,
            batch_size: 16,
            epochs: 20,
            learning_rate: 2e-5,
            seed: 42,
            dropout: 0.1,
            adversarial: true,
            fgm_epsilon: 1.0,
            demo_text: "导航去新浪总部".to_string(),
        }
    }
}

impl TrainingConfig {
    /// Load from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&content).with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.max_len < 2 {
            bail!("max_len must leave room for [CLS] and [SEP]");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            bail!("dropout must be in [0, 1), got {}", self.dropout);
        }
        if self.learning_rate <= 0.0 {
            bail!("learning_rate must be positive");
        }
        Ok(())
    }

    pub fn bert_config_path(&self) -> PathBuf {
        self.encoder_dir.join("config.json")
    }

    pub fn pretrained_weights_path(&self) -> PathBuf {
        self.encoder_dir.join("model.safetensors")
    }
}
