use std::path::Path;

use candle_core::Tensor;
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};

use crate::error::{JointNluError, Result};

/// Per-token hidden states plus one pooled vector per sequence.
pub struct EncoderOutput {
    /// `[batch, seq_len, hidden_size]`
    pub hidden_states: Tensor,
    /// `[batch, hidden_size]`
    pub pooled: Tensor,
}

/// A pretrained text encoder shared by all task heads.
pub trait Encoder {
    fn hidden_size(&self) -> usize;

    /// Encode `[batch, seq_len]` u32 token ids under an f32 attention mask.
    fn encode(&self, token_ids: &Tensor, attention_mask: &Tensor, train: bool) -> Result<EncoderOutput>;
}

/// BERT encoder with the standard tanh pooler over `[CLS]`.
pub struct BertEncoder {
    pub bert: BertModel,
    pub pooler: Linear,
    hidden_size: usize,
}

impl BertEncoder {
    /// Name of the word-embedding matrix relative to the encoder's prefix.
    pub const WORD_EMBEDDINGS: &'static str = "embeddings.word_embeddings.weight";

    /// Read a Hugging Face BERT `config.json`.
    pub fn config_from_file<P: AsRef<Path>>(path: P) -> Result<BertConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| JointNluError::ModelLoadError(format!("failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| JointNluError::ModelLoadError(format!("failed to parse {}: {e}", path.display())))
    }

    /// Load the model under `vb` (`embeddings.*`, `encoder.*`, `pooler.*`).
    pub fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        let bert = BertModel::load(vb.clone(), config)?;
        let pooler = candle_nn::linear(config.hidden_size, config.hidden_size, vb.pp("pooler.dense"))?;

        Ok(Self {
            bert,
            pooler,
            hidden_size: config.hidden_size,
        })
    }
}

impl Encoder for BertEncoder {
    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn encode(&self, token_ids: &Tensor, attention_mask: &Tensor, _train: bool) -> Result<EncoderOutput> {
        let token_type_ids = token_ids.zeros_like()?;
        let hidden_states = self
            .bert
            .forward(token_ids, &token_type_ids, Some(attention_mask))?;

        let cls = hidden_states.narrow(1, 0, 1)?.squeeze(1)?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;

        Ok(EncoderOutput {
            hidden_states,
            pooled,
        })
    }
}
