//! Shared encoder and the three task heads built on it.

pub mod config;
pub mod encoder;
pub mod joint;

pub use config::JointModelConfig;
pub use encoder::{BertEncoder, Encoder, EncoderOutput};
pub use joint::{
    DetectedEntity, ENCODER_PREFIX, IntentPrediction, JointModel, JointOutput, JointPrediction,
    argmax_with_confidence, attention_mask, pad_token_ids,
};
