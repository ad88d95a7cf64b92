use serde::{Deserialize, Serialize};

use crate::vocab::LabelVocabulary;

/// Head sizes and regularisation for [`JointModel`](crate::model::JointModel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointModelConfig {
    /// Number of intent classes.
    pub num_intents: usize,
    /// Span classifier width: entity types plus the padding class.
    pub num_span_classes: usize,
    /// Dropout applied to the pooled vector before the intent head.
    pub pooled_dropout: f32,
}

impl Default for JointModelConfig {
    fn default() -> Self {
        Self {
            num_intents: 1,
            num_span_classes: 2,
            pooled_dropout: 0.1,
        }
    }
}

impl JointModelConfig {
    /// Size the heads from a label vocabulary.
    pub fn from_vocab(vocab: &LabelVocabulary) -> Self {
        Self {
            num_intents: vocab.num_intents(),
            num_span_classes: vocab.num_span_classes(),
            ..Self::default()
        }
    }

    /// Set the pooled-output dropout probability.
    pub fn with_pooled_dropout(mut self, p: f32) -> Self {
        self.pooled_dropout = p.clamp(0.0, 1.0);
        self
    }
}
