//! # Joint Intent + Entity Model
//!
//! One encoder pass feeds three heads:
//!
//! - intent: `Linear(dropout(pooled))`
//! - tags: `Linear(hidden)` emissions, scored and decoded by a [`CrfLayer`]
//! - span types: `Linear(mean(hidden[start], hidden[end]))` per token span
//!
//! Inference is two-stage: the CRF path is turned into spans, and those spans
//! are then typed by the span head exactly as gold spans are during training.

use std::collections::BTreeSet;

use candle_core::{D, DType, Device, Tensor};
use candle_nn::{Dropout, Linear, Module, VarBuilder};
use candle_transformers::models::bert::Config as BertConfig;
use tracing::debug;

use crate::crf::CrfLayer;
use crate::error::Result;
use crate::model::config::JointModelConfig;
use crate::model::encoder::{BertEncoder, Encoder};
use crate::parser::bio_tags::BioTag;
use crate::parser::spans::spans_from_tags;
use crate::parser::tokenizer::PAD_ID;
use crate::supervision::span_tensor;
use crate::types::{EntityTuple, TokenSpan};

/// Variable-store prefix of the encoder weights.
pub const ENCODER_PREFIX: &str = "bert";

/// Raw head outputs of a forward pass.
pub struct JointOutput {
    /// `[batch, seq_len, 3]` tag emission scores.
    pub emissions: Tensor,
    /// `[batch, seq_len]` f32, 1.0 where the token id is not padding.
    pub attention_mask: Tensor,
    /// `[batch, num_spans, num_span_classes]`
    pub span_logits: Tensor,
    /// `[batch, num_intents]`
    pub intent_logits: Tensor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntentPrediction {
    pub id: u32,
    pub confidence: f32,
}

/// A decoded span with its predicted type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedEntity {
    pub span: TokenSpan,
    pub confidence: f32,
}

/// Decoded output for a batch, one entry per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct JointPrediction {
    pub tag_paths: Vec<Vec<BioTag>>,
    pub intents: Vec<IntentPrediction>,
    pub entities: Vec<Vec<DetectedEntity>>,
}

impl JointPrediction {
    /// All detected entities as `(sample, start, end, type_id)` tuples.
    pub fn entity_tuples(&self) -> BTreeSet<EntityTuple> {
        self.entities
            .iter()
            .enumerate()
            .flat_map(|(sample, row)| {
                row.iter()
                    .map(move |e| EntityTuple::new(sample, &e.span, e.span.type_id))
            })
            .collect()
    }
}

pub struct JointModel<E: Encoder = BertEncoder> {
    encoder: E,
    intent_head: Linear,
    tag_head: Linear,
    span_head: Linear,
    crf: CrfLayer,
    dropout: Dropout,
    config: JointModelConfig,
}

impl JointModel<BertEncoder> {
    /// Build a BERT-backed model; encoder weights live under [`ENCODER_PREFIX`].
    pub fn load_bert(vb: VarBuilder, bert: &BertConfig, config: JointModelConfig) -> Result<Self> {
        let encoder = BertEncoder::load(vb.pp(ENCODER_PREFIX), bert)?;
        Self::new(encoder, vb, config)
    }
}

impl<E: Encoder> JointModel<E> {
    pub fn new(encoder: E, vb: VarBuilder, config: JointModelConfig) -> Result<Self> {
        let hidden = encoder.hidden_size();
        let intent_head = candle_nn::linear(hidden, config.num_intents, vb.pp("intent_head"))?;
        let tag_head = candle_nn::linear(hidden, BioTag::NUM_TAGS, vb.pp("tag_head"))?;
        let span_head = candle_nn::linear(hidden, config.num_span_classes, vb.pp("span_head"))?;
        let crf = CrfLayer::load(vb.pp("crf"))?;
        let dropout = Dropout::new(config.pooled_dropout);

        Ok(Self {
            encoder,
            intent_head,
            tag_head,
            span_head,
            crf,
            dropout,
            config,
        })
    }

    pub fn config(&self) -> &JointModelConfig {
        &self.config
    }

    pub fn crf(&self) -> &CrfLayer {
        &self.crf
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Training forward pass over gold spans.
    ///
    /// # Arguments
    /// * `token_ids` - `[batch, seq_len]` u32, padded with [`PAD_ID`]
    /// * `spans` - `[batch, num_spans, 2]` u32 `(start, end)` token indices
    /// * `train` - enables dropout
    pub fn forward(&self, token_ids: &Tensor, spans: &Tensor, train: bool) -> Result<JointOutput> {
        let attention_mask = attention_mask(token_ids)?;
        let encoded = self.encoder.encode(token_ids, &attention_mask, train)?;

        let pooled = self.dropout.forward(&encoded.pooled, train)?;
        let intent_logits = self.intent_head.forward(&pooled)?;
        let emissions = self.tag_head.forward(&encoded.hidden_states)?;
        let span_logits = self.span_logits(&encoded.hidden_states, spans)?;

        Ok(JointOutput {
            emissions,
            attention_mask,
            span_logits,
            intent_logits,
        })
    }

    /// Two-stage decode: CRF path to spans, then span typing.
    pub fn predict(&self, token_ids: &Tensor) -> Result<JointPrediction> {
        let attention_mask = attention_mask(token_ids)?;
        let encoded = self.encoder.encode(token_ids, &attention_mask, false)?;

        let intent_logits = self.intent_head.forward(&encoded.pooled)?;
        let (intent_ids, intent_conf) = argmax_with_confidence(&intent_logits)?;
        let intents = intent_ids
            .to_vec1::<u32>()?
            .into_iter()
            .zip(intent_conf.to_vec1::<f32>()?)
            .map(|(id, confidence)| IntentPrediction { id, confidence })
            .collect();

        let emissions = self.tag_head.forward(&encoded.hidden_states)?;
        let tag_paths = self.crf.decode(&emissions, &attention_mask)?;
        let decoded: Vec<Vec<(usize, usize)>> = tag_paths
            .iter()
            .map(|path| {
                spans_from_tags(path)
                    .into_iter()
                    .map(|b| (b.start, b.end))
                    .collect()
            })
            .collect();

        let spans = span_tensor(&decoded, token_ids.device())?;
        let span_logits = self.span_logits(&encoded.hidden_states, &spans)?;
        let (type_ids, type_conf) = argmax_with_confidence(&span_logits)?;
        let type_ids: Vec<Vec<u32>> = type_ids.to_vec2()?;
        let type_conf: Vec<Vec<f32>> = type_conf.to_vec2()?;

        let entities: Vec<Vec<DetectedEntity>> = decoded
            .iter()
            .zip(type_ids.iter().zip(&type_conf))
            .map(|(bounds, (ids, conf))| {
                bounds
                    .iter()
                    .zip(ids.iter().zip(conf))
                    .map(|(&(start, end), (&type_id, &confidence))| DetectedEntity {
                        span: TokenSpan::new(start, end, type_id),
                        confidence,
                    })
                    .collect()
            })
            .collect();
        debug!(
            batch = entities.len(),
            spans = entities.iter().map(Vec::len).sum::<usize>(),
            "decoded batch"
        );

        Ok(JointPrediction {
            tag_paths,
            intents,
            entities,
        })
    }

    /// Type logits for each `(start, end)` in `spans`, from the mean of the
    /// two boundary hidden states.
    fn span_logits(&self, hidden: &Tensor, spans: &Tensor) -> Result<Tensor> {
        let (batch, count, _) = spans.dims3()?;
        let hidden_size = hidden.dim(2)?;
        let index = spans
            .reshape((batch, count * 2, 1))?
            .broadcast_as((batch, count * 2, hidden_size))?
            .contiguous()?;
        let states = hidden
            .gather(&index, 1)?
            .reshape((batch, count, 2, hidden_size))?
            .mean(2)?;
        Ok(self.span_head.forward(&states)?)
    }
}

/// f32 mask with 1.0 wherever `token_ids` is not [`PAD_ID`].
pub fn attention_mask(token_ids: &Tensor) -> Result<Tensor> {
    Ok(token_ids.ne(PAD_ID)?.to_dtype(DType::F32)?)
}

/// Argmax over the last dimension with its softmax probability.
pub fn argmax_with_confidence(logits: &Tensor) -> Result<(Tensor, Tensor)> {
    let probs = candle_nn::ops::softmax(logits, D::Minus1)?;
    let ids = probs.argmax(D::Minus1)?;
    let confidence = probs.max(D::Minus1)?;
    Ok((ids, confidence))
}

/// Token ids for a batch of already-tokenized rows, right-padded with [`PAD_ID`].
pub fn pad_token_ids(rows: &[Vec<u32>], device: &Device) -> Result<Tensor> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let mut flat = Vec::with_capacity(rows.len() * width);
    for row in rows {
        flat.extend_from_slice(row);
        flat.extend(std::iter::repeat_n(PAD_ID, width - row.len()));
    }
    Ok(Tensor::from_vec(flat, (rows.len(), width), device)?)
}
