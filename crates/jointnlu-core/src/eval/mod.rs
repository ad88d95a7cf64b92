//! Held-out scoring: set-based entity P/R/F1 and intent accuracy / macro-F1.

pub mod evaluator;
pub mod metrics;

pub use evaluator::{EvaluationReport, Evaluator};
pub use metrics::{EPSILON, EntityCounter, PrfScore, accuracy, macro_f1};
