//! Training loop for the joint model.
//!
//! Each step runs forward, loss, backward and the optimizer update strictly
//! in order. The best model by validation score is written at the end of the
//! epoch that produced it, before the next epoch starts.

use std::path::Path;

use anyhow::{Context, anyhow};
use candle_core::backprop::GradStore;
use candle_core::{DType, Device, Var};
use candle_nn::optim::{AdamW, Optimizer, ParamsAdamW};
use candle_nn::{VarBuilder, VarMap};
use candle_transformers::models::bert::Config as BertConfig;
use jointnlu_core::eval::{EvaluationReport, Evaluator};
use jointnlu_core::model::{BertEncoder, ENCODER_PREFIX, JointModel, JointModelConfig};
use jointnlu_core::objective::{LossScalars, joint_loss};
use jointnlu_core::parser::{AnnotationParser, SubwordTokenizer, load_from_dir};
use jointnlu_core::supervision::{BatchTensors, EncodedBatch, SupervisionEncoder};
use jointnlu_core::types::ParsedExample;
use jointnlu_core::vocab::LabelVocabulary;
use oorandom::Rand64;
use tracing::{debug, info, warn};

use crate::adversarial::{Fgm, merge_grads};
use crate::config::TrainingConfig;
use crate::data::Dataset;

pub struct Trainer {
    config: TrainingConfig,
    device: Device,
    varmap: VarMap,
    model: JointModel<BertEncoder>,
    tokenizer: Box<dyn SubwordTokenizer>,
    vocab: LabelVocabulary,
    optimizer: AdamW,
    fgm: Option<Fgm>,
}

impl Trainer {
    pub fn new(
        config: TrainingConfig,
        vocab: LabelVocabulary,
        tokenizer: Box<dyn SubwordTokenizer>,
        bert: &BertConfig,
        device: Device,
    ) -> anyhow::Result<Self> {
        if tokenizer.vocab_size() > bert.vocab_size {
            warn!(
                tokenizer = tokenizer.vocab_size(),
                encoder = bert.vocab_size,
                "tokenizer ids exceed the encoder vocabulary"
            );
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model_config = JointModelConfig::from_vocab(&vocab).with_pooled_dropout(config.dropout);
        let model = JointModel::load_bert(vb, bert, model_config).context("failed to build model")?;

        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: config.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;
        let fgm = config.adversarial.then(|| Fgm::new(config.fgm_epsilon));

        Ok(Self {
            config,
            device,
            varmap,
            model,
            tokenizer,
            vocab,
            optimizer,
            fgm,
        })
    }

    /// Build everything a run needs from `config`: corpus, vocabularies,
    /// tokenizer and encoder configuration, plus pretrained weights when the
    /// encoder directory has them.
    ///
    /// Returns the trainer with its training and validation splits.
    pub fn from_config(config: TrainingConfig) -> anyhow::Result<(Self, Dataset, Dataset)> {
        config.validate()?;
        let parser = AnnotationParser::new()?;

        let (corpus, train) = Dataset::load(&config.corpus_path, &parser)?;
        let vocab = LabelVocabulary::from_corpus(&corpus)?;
        info!(intents = ?vocab.intents(), entity_types = ?vocab.entity_types(), "built label vocabulary");

        let valid = match &config.validation_path {
            Some(path) => Dataset::load(path, &parser)?.1,
            None => train.clone(),
        };

        let tokenizer = load_from_dir(&config.encoder_dir, config.max_len)?;
        let bert = BertEncoder::config_from_file(config.bert_config_path())?;
        let device = Device::Cpu;

        let weights = config.pretrained_weights_path();
        let trainer = Self::new(config, vocab, tokenizer, &bert, device)?;
        if weights.exists() {
            trainer.load_pretrained(&weights)?;
        } else {
            warn!(path = %weights.display(), "no pretrained encoder weights; training from scratch");
        }

        Ok((trainer, train, valid))
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn model(&self) -> &JointModel<BertEncoder> {
        &self.model
    }

    pub fn tokenizer(&self) -> &dyn SubwordTokenizer {
        self.tokenizer.as_ref()
    }

    pub fn vocab(&self) -> &LabelVocabulary {
        &self.vocab
    }

    /// Copy matching encoder tensors from a Hugging Face BERT checkpoint.
    ///
    /// Returns the number of variables initialised; the rest keep their
    /// random initialisation.
    pub fn load_pretrained<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<usize> {
        let path = path.as_ref();
        let tensors = candle_core::safetensors::load(path, &self.device)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let vars = self.varmap.data().lock().map_err(|_| anyhow!("variable store lock poisoned"))?;
        let mut loaded = 0;
        let mut missing = Vec::new();
        for (name, var) in vars.iter().filter(|(name, _)| name.starts_with(ENCODER_PREFIX)) {
            let found = checkpoint_names(name).iter().find_map(|n| tensors.get(n));
            match found {
                Some(tensor) if tensor.dims() == var.dims() => {
                    var.set(&tensor.to_dtype(var.dtype())?)?;
                    loaded += 1;
                }
                Some(tensor) => warn!(
                    name = %name,
                    expected = ?var.dims(),
                    found = ?tensor.dims(),
                    "shape mismatch; keeping initialisation"
                ),
                None => missing.push(name.clone()),
            }
        }

        if !missing.is_empty() {
            debug!(?missing, "encoder variables absent from checkpoint");
        }
        info!(path = %path.display(), loaded, missing = missing.len(), "loaded pretrained encoder");
        Ok(loaded)
    }

    pub fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.varmap
            .save(path)
            .with_context(|| format!("failed to save checkpoint {}", path.display()))?;
        info!(path = %path.display(), "saved checkpoint");
        Ok(())
    }

    pub fn load_checkpoint<P: AsRef<Path>>(&mut self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        self.varmap
            .load(path)
            .with_context(|| format!("failed to load checkpoint {}", path.display()))?;
        info!(path = %path.display(), "loaded checkpoint");
        Ok(())
    }

    pub fn encode(&self, examples: &[ParsedExample]) -> anyhow::Result<EncodedBatch> {
        let encoder = SupervisionEncoder::new(self.tokenizer.as_ref(), &self.vocab);
        Ok(encoder.encode_batch(examples)?)
    }

    /// One optimisation step, adversarial when FGM is enabled.
    pub fn train_step(&mut self, batch: &EncodedBatch) -> anyhow::Result<LossScalars> {
        let tensors = batch.to_tensors(&self.device)?;
        let output = self.model.forward(&tensors.token_ids, &tensors.spans, true)?;
        let loss = joint_loss(self.model.crf(), &output, &tensors)?;
        let mut grads = loss.total.backward()?;

        if let Some(fgm) = self.fgm.as_mut() {
            let embeddings = word_embeddings(&self.varmap)?;
            if fgm.attack(&embeddings, &grads)? {
                let adv_grads = fgm.perturbed(&embeddings, || adversarial_grads(&self.model, &tensors))?;
                merge_grads(&mut grads, &adv_grads, &self.varmap.all_vars())?;
            }
        }

        self.optimizer.step(&grads)?;
        Ok(loss.scalars()?)
    }

    /// Loss of `batch` without dropout or parameter updates.
    pub fn loss(&self, batch: &EncodedBatch) -> anyhow::Result<LossScalars> {
        let tensors = batch.to_tensors(&self.device)?;
        let output = self.model.forward(&tensors.token_ids, &tensors.spans, false)?;
        Ok(joint_loss(self.model.crf(), &output, &tensors)?.scalars()?)
    }

    pub fn evaluate(&self, dataset: &Dataset) -> anyhow::Result<EvaluationReport> {
        let mut evaluator = Evaluator::new();
        for examples in dataset.batches(self.config.batch_size) {
            let batch = self.encode(examples)?;
            let tensors = batch.to_tensors(&self.device)?;
            let prediction = self.model.predict(&tensors.token_ids)?;
            evaluator.update(&batch, &prediction);
        }
        Ok(evaluator.finish())
    }

    /// Train for the configured epochs, saving the best model by
    /// `(entity_f1 + intent_macro_f1) / 2`. Returns the best score.
    pub fn fit(&mut self, train: &Dataset, valid: &Dataset) -> anyhow::Result<f64> {
        let mut rng = Rand64::new(self.config.seed as u128);
        let mut best = 0.0;
        info!(
            examples = train.len(),
            epochs = self.config.epochs,
            batch_size = self.config.batch_size,
            adversarial = self.fgm.is_some(),
            "starting training"
        );

        for epoch in 1..=self.config.epochs {
            let batches = train.shuffled_batches(self.config.batch_size, &mut rng);
            let mut epoch_loss = 0.0;
            let mut dropped = 0;

            for (step, examples) in batches.iter().enumerate() {
                let batch = self.encode(examples)?;
                dropped += batch.dropped_spans;
                let scalars = self.train_step(&batch)?;
                debug!(epoch, step = step + 1, steps = batches.len(), "{scalars}");
                epoch_loss += scalars.total;
            }

            let mean_loss = epoch_loss / batches.len().max(1) as f32;
            let report = self.evaluate(valid)?;
            let score = report.combined();
            if score > best {
                best = score;
                self.save_checkpoint(&self.config.checkpoint_path)?;
            }

            info!(epoch, loss = mean_loss, dropped_spans = dropped, "epoch complete");
            info!(
                f1 = report.entity.f1,
                precision = report.entity.precision,
                recall = report.entity.recall,
                "entity"
            );
            info!(f1 = report.intent_macro_f1, accuracy = report.intent_accuracy, "intent");
            info!(best_f1 = best, "combined");
        }

        Ok(best)
    }
}

/// Gradients of the loss against the currently perturbed embeddings.
fn adversarial_grads(model: &JointModel<BertEncoder>, tensors: &BatchTensors) -> anyhow::Result<GradStore> {
    let output = model.forward(&tensors.token_ids, &tensors.spans, true)?;
    let loss = joint_loss(model.crf(), &output, tensors)?;
    Ok(loss.total.backward()?)
}

/// The encoder's word-embedding variable.
fn word_embeddings(varmap: &VarMap) -> anyhow::Result<Var> {
    let name = format!("{ENCODER_PREFIX}.{}", BertEncoder::WORD_EMBEDDINGS);
    let vars = varmap.data().lock().map_err(|_| anyhow!("variable store lock poisoned"))?;
    vars.get(&name)
        .cloned()
        .ok_or_else(|| anyhow!("variable {name} not found"))
}

/// Names a variable may carry in a pretrained checkpoint: with or without
/// the encoder prefix, and with legacy `gamma`/`beta` layer-norm names.
fn checkpoint_names(name: &str) -> Vec<String> {
    let mut names = vec![name.to_string()];
    if let Some(bare) = name.strip_prefix(ENCODER_PREFIX).and_then(|n| n.strip_prefix('.')) {
        names.push(bare.to_string());
    }
    let legacy: Vec<String> = names.iter().filter_map(|n| legacy_layer_norm_name(n)).collect();
    names.extend(legacy);
    names
}

fn legacy_layer_norm_name(name: &str) -> Option<String> {
    if !name.contains("LayerNorm.") {
        return None;
    }
    name.strip_suffix(".weight")
        .map(|stem| format!("{stem}.gamma"))
        .or_else(|| name.strip_suffix(".bias").map(|stem| format!("{stem}.beta")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use candle_core::Tensor;
    use jointnlu_core::parser::HfTokenizer;

    use super::*;

    const HIDDEN: usize = 8;

    fn tiny_trainer() -> Trainer {
        let tokenizer = HfTokenizer::from_tokens(["[PAD]", "[UNK]", "[CLS]", "[SEP]", "导", "航"], 16).unwrap();
        let bert = BertConfig {
            vocab_size: tokenizer.vocab_size(),
            hidden_size: HIDDEN,
            num_hidden_layers: 1,
            num_attention_heads: 2,
            intermediate_size: 16,
            max_position_embeddings: 16,
            ..Default::default()
        };
        let vocab = LabelVocabulary::from_labels(["navigate"], ["location"]);
        Trainer::new(TrainingConfig::default(), vocab, Box::new(tokenizer), &bert, Device::Cpu).unwrap()
    }

    fn variable(trainer: &Trainer, name: &str) -> Vec<f32> {
        let vars = trainer.varmap.data().lock().unwrap();
        vars[name].as_tensor().flatten_all().unwrap().to_vec1().unwrap()
    }

    #[test]
    fn test_load_pretrained_maps_bare_and_legacy_names() {
        let trainer = tiny_trainer();
        let pooler_before = variable(&trainer, "bert.pooler.dense.weight");

        let device = Device::Cpu;
        let tensors: HashMap<String, Tensor> = [
            (
                "embeddings.word_embeddings.weight",
                Tensor::full(0.5f32, (6, HIDDEN), &device).unwrap(),
            ),
            (
                "embeddings.LayerNorm.gamma",
                Tensor::full(2.0f32, HIDDEN, &device).unwrap(),
            ),
            // Wrong shape: skipped.
            ("pooler.dense.weight", Tensor::full(7.0f32, (2, 2), &device).unwrap()),
            // Not an encoder variable: ignored.
            ("intent_head.weight", Tensor::full(9.0f32, (1, HIDDEN), &device).unwrap()),
        ]
        .into_iter()
        .map(|(name, t)| (name.to_string(), t))
        .collect();

        let path = std::env::temp_dir().join(format!("jointnlu-pretrained-{}.safetensors", std::process::id()));
        candle_core::safetensors::save(&tensors, &path).unwrap();

        let loaded = trainer.load_pretrained(&path).unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(
            variable(&trainer, "bert.embeddings.word_embeddings.weight"),
            vec![0.5; 6 * HIDDEN]
        );
        assert_eq!(variable(&trainer, "bert.embeddings.LayerNorm.weight"), vec![2.0; HIDDEN]);
        assert_eq!(variable(&trainer, "bert.pooler.dense.weight"), pooler_before);
        assert!(variable(&trainer, "intent_head.weight").iter().all(|&v| v != 9.0));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_pretrained_missing_file_fails() {
        let trainer = tiny_trainer();
        let err = trainer.load_pretrained("does/not/exist.safetensors").unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn test_checkpoint_names() {
        assert_eq!(
            checkpoint_names("bert.encoder.layer.0.output.dense.weight"),
            vec![
                "bert.encoder.layer.0.output.dense.weight".to_string(),
                "encoder.layer.0.output.dense.weight".to_string(),
            ]
        );
        assert_eq!(
            checkpoint_names("bert.embeddings.LayerNorm.bias"),
            vec![
                "bert.embeddings.LayerNorm.bias".to_string(),
                "embeddings.LayerNorm.bias".to_string(),
                "bert.embeddings.LayerNorm.beta".to_string(),
                "embeddings.LayerNorm.beta".to_string(),
            ]
        );
    }

    #[test]
    fn test_legacy_layer_norm_name() {
        assert_eq!(
            legacy_layer_norm_name("a.LayerNorm.weight").as_deref(),
            Some("a.LayerNorm.gamma")
        );
        assert_eq!(legacy_layer_norm_name("a.dense.weight"), None);
    }
}
