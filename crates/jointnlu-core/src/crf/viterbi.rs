//! # Viterbi Decoding for CRF
//!
//! Finds the highest-scoring BIO path given emission scores, learned
//! transition scores and the hard constraints of
//! [`BioTag::is_valid_transition`].

use crate::error::{JointNluError, Result};
use crate::parser::bio_tags::BioTag;

/// Learned CRF scores, copied off the device for decoding.
#[derive(Debug, Clone)]
pub struct TransitionScores {
    /// `[from][to]` transition scores.
    pub transitions: Vec<Vec<f32>>,
    /// Score of starting a sequence in each tag.
    pub start: Vec<f32>,
    /// Score of ending a sequence in each tag.
    pub end: Vec<f32>,
}

impl TransitionScores {
    /// All-zero scores: decoding reduces to constrained per-token argmax.
    pub fn zeros(num_tags: usize) -> Self {
        Self {
            transitions: vec![vec![0.0; num_tags]; num_tags],
            start: vec![0.0; num_tags],
            end: vec![0.0; num_tags],
        }
    }
}

/// Viterbi decoder for CRF tag sequences.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    num_tags: usize,
    valid: Vec<Vec<bool>>,
    valid_start: Vec<bool>,
}

impl ViterbiDecoder {
    /// Create a decoder over the BIO tag set.
    pub fn new() -> Self {
        let num_tags = BioTag::NUM_TAGS;
        let tags = BioTag::all_tags();

        let valid = tags
            .iter()
            .map(|&from| {
                tags.iter()
                    .map(|&to| BioTag::is_valid_transition(from, to))
                    .collect()
            })
            .collect();
        let valid_start = tags.iter().map(|&t| BioTag::is_valid_start(t)).collect();

        Self {
            num_tags,
            valid,
            valid_start,
        }
    }

    /// Decode the optimal tag sequence.
    ///
    /// # Arguments
    /// * `emission_scores` - Matrix of shape [seq_len, num_tags]
    /// * `scores` - Learned transition/start/end scores
    ///
    /// # Returns
    /// The optimal tag sequence as indices, of length `seq_len`.
    pub fn decode(&self, emission_scores: &[Vec<f32>], scores: &TransitionScores) -> Result<Vec<usize>> {
        let seq_len = emission_scores.len();
        if seq_len == 0 {
            return Ok(Vec::new());
        }

        if let Some(row) = emission_scores.iter().find(|row| row.len() != self.num_tags) {
            return Err(JointNluError::Shape(format!(
                "emission score dimension mismatch: expected {}, got {}",
                self.num_tags,
                row.len()
            )));
        }
        if scores.transitions.len() != self.num_tags
            || scores.start.len() != self.num_tags
            || scores.end.len() != self.num_tags
        {
            return Err(JointNluError::Shape(format!(
                "transition scores must cover {} tags",
                self.num_tags
            )));
        }

        // DP table
        let mut dp: Vec<Vec<f32>> = vec![vec![f32::NEG_INFINITY; self.num_tags]; seq_len];
        let mut backptr: Vec<Vec<usize>> = vec![vec![0; self.num_tags]; seq_len];

        // Initialize
        for tag in 0..self.num_tags {
            if self.valid_start[tag] {
                dp[0][tag] = scores.start[tag] + emission_scores[0][tag];
            }
        }

        // Forward pass with constraints
        for pos in 1..seq_len {
            for curr_tag in 0..self.num_tags {
                let mut best_score = f32::NEG_INFINITY;
                let mut best_prev = 0;

                for prev_tag in 0..self.num_tags {
                    if !self.valid[prev_tag][curr_tag] {
                        continue;
                    }

                    let score = dp[pos - 1][prev_tag] + scores.transitions[prev_tag][curr_tag];
                    if score > best_score {
                        best_score = score;
                        best_prev = prev_tag;
                    }
                }

                dp[pos][curr_tag] = best_score + emission_scores[pos][curr_tag];
                backptr[pos][curr_tag] = best_prev;
            }
        }

        // Backtrack
        let mut best_final_tag = 0;
        let mut best_final_score = f32::NEG_INFINITY;
        for tag in 0..self.num_tags {
            let score = dp[seq_len - 1][tag] + scores.end[tag];
            if score > best_final_score {
                best_final_score = score;
                best_final_tag = tag;
            }
        }

        let mut path = vec![best_final_tag];
        let mut curr_tag = best_final_tag;

        for pos in (1..seq_len).rev() {
            curr_tag = backptr[pos][curr_tag];
            path.push(curr_tag);
        }

        path.reverse();
        Ok(path)
    }
}

impl Default for ViterbiDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viterbi_follows_emissions() {
        let decoder = ViterbiDecoder::new();
        let emissions = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![1.0, 0.0, 0.0],
        ];

        let path = decoder.decode(&emissions, &TransitionScores::zeros(3)).unwrap();
        assert_eq!(path, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_viterbi_never_emits_inside_after_outside() {
        let decoder = ViterbiDecoder::new();
        // Unconstrained, O -> I would score highest.
        let emissions = vec![vec![1.0, 0.5, 0.0], vec![0.0, 0.1, 3.0]];

        let path = decoder.decode(&emissions, &TransitionScores::zeros(3)).unwrap();
        assert_ne!(path, vec![0, 2]);
        assert_eq!(path, vec![1, 2]);
    }

    #[test]
    fn test_viterbi_never_starts_inside() {
        let decoder = ViterbiDecoder::new();
        let emissions = vec![vec![0.0, 0.0, 9.0]];

        let path = decoder.decode(&emissions, &TransitionScores::zeros(3)).unwrap();
        assert_ne!(path[0], BioTag::Inside.index());
    }

    #[test]
    fn test_transition_scores_matter() {
        let decoder = ViterbiDecoder::new();
        let emissions = vec![vec![0.0, 1.0, 0.0], vec![0.6, 0.0, 0.5]];
        let mut scores = TransitionScores::zeros(3);
        scores.transitions[1][2] = 1.0;

        let path = decoder.decode(&emissions, &scores).unwrap();
        assert_eq!(path, vec![1, 2]);
    }

    #[test]
    fn test_viterbi_empty() {
        let decoder = ViterbiDecoder::new();
        let path = decoder.decode(&[], &TransitionScores::zeros(3)).unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let decoder = ViterbiDecoder::new();
        let err = decoder
            .decode(&[vec![0.0; 5]], &TransitionScores::zeros(3))
            .unwrap_err();
        assert!(matches!(err, JointNluError::Shape(_)));
    }
}
