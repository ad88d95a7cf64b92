//! # JointNLU Core
//!
//! Joint intent classification and entity extraction over one shared
//! transformer encoder. Provides the annotation parser, label vocabulary,
//! supervision encoding, the CRF-decoded joint model, its objective and a
//! set-based evaluator.
//!
//! ## Quick Start
//!
//! ```rust
//! use jointnlu_core::parser::AnnotationParser;
//!
//! let parser = AnnotationParser::new().unwrap();
//! let example = parser.parse("导航去[新浪总部](location)", "navigate");
//!
//! assert_eq!(example.text, "导航去新浪总部");
//! assert_eq!(example.spans[0].surface(&example.text), Some("新浪总部"));
//! assert_eq!(example.spans[0].label, "location");
//! ```
pub mod crf;
pub mod error;
pub mod eval;
pub mod model;
pub mod objective;
pub mod parser;
pub mod supervision;
pub mod types;
pub mod vocab;

// Re-export primary API
pub use error::{JointNluError, Result};
pub use eval::{EvaluationReport, Evaluator};
pub use model::{BertEncoder, Encoder, JointModel, JointModelConfig, JointPrediction};
pub use objective::{LossBreakdown, LossScalars, joint_loss};
pub use parser::{AnnotationParser, BioTag, Corpus, SubwordTokenizer};
pub use supervision::{BatchTensors, EncodedBatch, SupervisionEncoder};
pub use types::{EntitySpan, EntityTuple, ParsedExample, TokenSpan};
pub use vocab::LabelVocabulary;
