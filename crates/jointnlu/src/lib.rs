//! # JointNLU
//!
//! Joint intent classification and entity extraction for bracket-annotated
//! NLU corpora. Re-exports the model library and the training toolkit.

pub use jointnlu_core as core;
pub use jointnlu_trainer as trainer;

pub use jointnlu_core::{
    AnnotationParser, BioTag, Corpus, EntitySpan, EvaluationReport, JointModel, JointNluError, JointPrediction,
    LabelVocabulary, ParsedExample, Result, SupervisionEncoder,
};
pub use jointnlu_trainer::{Interpretation, Trainer, TrainingConfig};
