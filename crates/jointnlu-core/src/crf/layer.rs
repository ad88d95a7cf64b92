use candle_core::{DType, Device, Tensor};
use candle_nn::{Init, VarBuilder};

use crate::crf::viterbi::{TransitionScores, ViterbiDecoder};
use crate::error::{JointNluError, Result};
use crate::parser::bio_tags::BioTag;

/// Linear-chain CRF over BIO tags.
///
/// Holds learned start, end and pairwise transition scores. Training uses
/// the mean negative log-likelihood of the gold path; decoding uses
/// constrained Viterbi.
pub struct CrfLayer {
    pub start_transitions: Tensor,
    pub end_transitions: Tensor,
    pub transitions: Tensor,
    num_tags: usize,
    viterbi: ViterbiDecoder,
}

impl CrfLayer {
    /// Create (or load) the CRF parameters under `vb`.
    pub fn load(vb: VarBuilder) -> Result<Self> {
        let num_tags = BioTag::NUM_TAGS;
        let init = Init::Uniform { lo: -0.1, up: 0.1 };
        let start_transitions = vb.get_with_hints(num_tags, "start_transitions", init)?;
        let end_transitions = vb.get_with_hints(num_tags, "end_transitions", init)?;
        let transitions = vb.get_with_hints((num_tags, num_tags), "transitions", init)?;

        Ok(Self {
            start_transitions,
            end_transitions,
            transitions,
            num_tags,
            viterbi: ViterbiDecoder::new(),
        })
    }

    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    /// Mean negative log-likelihood of `tags` under the CRF.
    ///
    /// # Arguments
    /// * `emissions` - `[batch, seq_len, num_tags]` f32 scores
    /// * `mask` - `[batch, seq_len]` f32, 1.0 for real tokens; each row must
    ///   be a prefix of ones starting at position 0
    /// * `tags` - `[batch, seq_len]` u32 gold tag indices
    pub fn neg_log_likelihood(&self, emissions: &Tensor, mask: &Tensor, tags: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, num_tags) = emissions.dims3()?;
        if num_tags != self.num_tags {
            return Err(JointNluError::Shape(format!(
                "CRF expects {} tags, emissions have {num_tags}",
                self.num_tags
            )));
        }
        let device = emissions.device();
        let host_tags: Vec<Vec<u32>> = tags.to_vec2()?;
        let lengths = sequence_lengths(mask)?;

        // Gold path score.
        let emitted = emissions
            .gather(&tags.unsqueeze(2)?.contiguous()?, 2)?
            .squeeze(2)?;
        let mut gold = (emitted * mask)?.sum(1)?;

        let first: Vec<u32> = host_tags.iter().map(|row| row[0]).collect();
        let first = Tensor::from_vec(first, batch, device)?;
        gold = (gold + self.start_transitions.index_select(&first, 0)?)?;

        if seq_len > 1 {
            let pairs: Vec<u32> = host_tags
                .iter()
                .flat_map(|row| row.windows(2).map(|w| w[0] * num_tags as u32 + w[1]))
                .collect();
            let pairs = Tensor::from_vec(pairs, batch * (seq_len - 1), device)?;
            let pair_scores = self
                .transitions
                .flatten_all()?
                .index_select(&pairs, 0)?
                .reshape((batch, seq_len - 1))?;
            let pair_mask = mask.narrow(1, 1, seq_len - 1)?;
            gold = (gold + (pair_scores * pair_mask)?.sum(1)?)?;
        }

        let last: Vec<u32> = host_tags
            .iter()
            .zip(&lengths)
            .map(|(row, &len)| row[len.saturating_sub(1)])
            .collect();
        let last = Tensor::from_vec(last, batch, device)?;
        gold = (gold + self.end_transitions.index_select(&last, 0)?)?;

        // Partition function (forward algorithm).
        let transitions = self.transitions.unsqueeze(0)?;
        let mut alpha = emissions
            .narrow(1, 0, 1)?
            .squeeze(1)?
            .broadcast_add(&self.start_transitions.unsqueeze(0)?)?;
        for pos in 1..seq_len {
            let emit = emissions.narrow(1, pos, 1)?.squeeze(1)?.unsqueeze(1)?;
            let step = alpha
                .unsqueeze(2)?
                .broadcast_add(&transitions)?
                .broadcast_add(&emit)?;
            let next = log_sum_exp(&step, 1)?;
            let keep = mask.narrow(1, pos, 1)?;
            let hold = keep.affine(-1.0, 1.0)?;
            alpha = (next.broadcast_mul(&keep)? + alpha.broadcast_mul(&hold)?)?;
        }
        let log_z = log_sum_exp(&alpha.broadcast_add(&self.end_transitions.unsqueeze(0)?)?, 1)?;

        Ok((log_z - gold)?.mean_all()?)
    }

    /// Constrained Viterbi decode of each row of `emissions`.
    ///
    /// Positions where `mask` is 0 are excluded from decoding and reported as
    /// [`BioTag::Outside`], so every returned path has length `seq_len`.
    pub fn decode(&self, emissions: &Tensor, mask: &Tensor) -> Result<Vec<Vec<BioTag>>> {
        let (_, seq_len, _) = emissions.dims3()?;
        let rows: Vec<Vec<Vec<f32>>> = emissions.to_dtype(DType::F32)?.to_vec3()?;
        let lengths = sequence_lengths(mask)?;
        let scores = self.transition_scores()?;

        rows.into_iter()
            .zip(lengths)
            .map(|(row, len)| {
                let indices = self.viterbi.decode(&row[..len], &scores)?;
                let mut path: Vec<BioTag> = indices
                    .into_iter()
                    .map(|i| BioTag::from_index(i).unwrap_or_default())
                    .collect();
                path.resize(seq_len, BioTag::Outside);
                Ok(path)
            })
            .collect()
    }

    /// Copy the learned scores to the host.
    pub fn transition_scores(&self) -> Result<TransitionScores> {
        Ok(TransitionScores {
            transitions: self.transitions.to_dtype(DType::F32)?.to_vec2()?,
            start: self.start_transitions.to_dtype(DType::F32)?.to_vec1()?,
            end: self.end_transitions.to_dtype(DType::F32)?.to_vec1()?,
        })
    }

    pub fn device(&self) -> &Device {
        self.transitions.device()
    }
}

/// Number of leading unmasked positions in each row.
fn sequence_lengths(mask: &Tensor) -> Result<Vec<usize>> {
    let rows: Vec<Vec<f32>> = mask.to_dtype(DType::F32)?.to_vec2()?;
    Ok(rows
        .iter()
        .map(|row| row.iter().filter(|&&m| m > 0.5).count())
        .collect())
}

/// Numerically stable `log(sum(exp(x)))` over `dim`, removing that dimension.
pub fn log_sum_exp(xs: &Tensor, dim: usize) -> Result<Tensor> {
    let max = xs.max_keepdim(dim)?;
    let shifted = xs.broadcast_sub(&max)?.exp()?.sum_keepdim(dim)?.log()?;
    Ok((shifted + max)?.squeeze(dim)?)
}
