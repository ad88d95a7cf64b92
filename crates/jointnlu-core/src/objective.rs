//! # Joint Objective
//!
//! Unweighted mean of three losses:
//!
//! 1. CRF negative log-likelihood of the gold tag path;
//! 2. span-type cross-entropy, ignoring padding spans (type id 0);
//! 3. intent cross-entropy.

use std::fmt;

use candle_core::{D, DType, Tensor};
use candle_nn::ops::log_softmax;

use crate::crf::CrfLayer;
use crate::error::Result;
use crate::model::JointOutput;
use crate::supervision::BatchTensors;

/// Span type id excluded from the span loss.
pub const SPAN_IGNORE_INDEX: u32 = 0;

/// The aggregate loss and its three terms, all scalar tensors.
pub struct LossBreakdown {
    pub total: Tensor,
    pub tag: Tensor,
    pub span: Tensor,
    pub intent: Tensor,
}

/// Host copies of a [`LossBreakdown`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LossScalars {
    pub total: f32,
    pub tag: f32,
    pub span: f32,
    pub intent: f32,
}

impl LossBreakdown {
    pub fn scalars(&self) -> Result<LossScalars> {
        Ok(LossScalars {
            total: self.total.to_scalar()?,
            tag: self.tag.to_scalar()?,
            span: self.span.to_scalar()?,
            intent: self.intent.to_scalar()?,
        })
    }
}

impl LossScalars {
    pub fn is_finite(&self) -> bool {
        [self.total, self.tag, self.span, self.intent]
            .iter()
            .all(|v| v.is_finite())
    }
}

impl fmt::Display for LossScalars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "loss {:.4} (tag {:.4}, span {:.4}, intent {:.4})",
            self.total, self.tag, self.span, self.intent
        )
    }
}

/// Combine the head outputs of a forward pass with the batch targets.
pub fn joint_loss(crf: &CrfLayer, output: &JointOutput, batch: &BatchTensors) -> Result<LossBreakdown> {
    let tag = crf.neg_log_likelihood(&output.emissions, &output.attention_mask, &batch.tags)?;

    let (b, n, classes) = output.span_logits.dims3()?;
    let span = cross_entropy_with_ignore(
        &output.span_logits.reshape((b * n, classes))?,
        &batch.span_types.reshape(b * n)?,
        SPAN_IGNORE_INDEX,
    )?;

    let intent = candle_nn::loss::cross_entropy(&output.intent_logits, &batch.intents)?;

    let total = ((((&tag + &span)? + &intent)?) / 3.0)?;
    Ok(LossBreakdown {
        total,
        tag,
        span,
        intent,
    })
}

/// Mean cross-entropy over rows whose target is not `ignore_index`.
///
/// Returns a zero scalar when every target is ignored.
pub fn cross_entropy_with_ignore(logits: &Tensor, targets: &Tensor, ignore_index: u32) -> Result<Tensor> {
    let keep = targets.ne(ignore_index)?.to_dtype(DType::F32)?;
    let count: f32 = keep.sum_all()?.to_scalar()?;
    if count == 0.0 {
        return Ok(Tensor::zeros((), DType::F32, logits.device())?);
    }

    let picked = log_softmax(logits, D::Minus1)?
        .gather(&targets.unsqueeze(1)?.contiguous()?, 1)?
        .squeeze(1)?;
    let total = (picked * keep)?.sum_all()?.neg()?;
    Ok((total / count as f64)?)
}
