use serde::{Deserialize, Serialize};

use super::span::EntitySpan;

/// One training utterance after its annotation markup has been removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedExample {
    /// Clean utterance text.
    pub text: String,

    /// Intent name (namespace stripped).
    pub intent: String,

    /// Entity occurrences in left-to-right annotation order.
    pub spans: Vec<EntitySpan>,

    /// Annotations whose entity text could not be located in the clean text.
    pub malformed: usize,
}

impl ParsedExample {
    /// Creates an example without entities.
    #[must_use]
    pub fn new(text: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            intent: intent.into(),
            spans: Vec::new(),
            malformed: 0,
        }
    }

    /// Adds an entity span, builder style.
    #[must_use]
    pub fn with_span(mut self, span: EntitySpan) -> Self {
        self.spans.push(span);
        self
    }
}
