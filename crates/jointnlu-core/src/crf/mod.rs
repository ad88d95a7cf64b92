//! # Sequence-Tagging Decision Layer
//!
//! CRF over BIO tags: differentiable path likelihood for training and
//! constrained Viterbi for decoding.

pub mod layer;
pub mod viterbi;

pub use layer::CrfLayer;
pub use viterbi::{TransitionScores, ViterbiDecoder};
