use thiserror::Error;

/// Errors that can occur during joint NLU operations.
#[derive(Debug, Error)]
pub enum JointNluError {
    /// The corpus file could not be read.
    #[error("failed to read corpus: {0}")]
    Io(#[from] std::io::Error),

    /// The corpus is not valid YAML.
    #[error("invalid corpus YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The corpus parsed but does not have the expected shape.
    #[error("malformed corpus: {0}")]
    Corpus(String),

    /// A regex pattern failed to compile (should not happen with static patterns).
    #[error("regex compilation error: {0}")]
    RegexError(#[from] regex::Error),

    /// A label was looked up that the closed vocabulary does not contain.
    #[error("unknown {kind} label: {label:?}")]
    UnknownLabel {
        /// Which vocabulary was consulted ("intent" or "entity").
        kind: &'static str,
        /// The label that was not found.
        label: String,
    },

    /// The tokenizer could not be loaded or failed on an input.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// The model configuration or weights could not be loaded.
    #[error("failed to load model: {0}")]
    ModelLoadError(String),

    /// Tensor shapes or contents did not match what a stage expects.
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// Candle ML framework error.
    #[error("ML framework error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type alias for joint NLU operations.
pub type Result<T> = std::result::Result<T, JointNluError>;
