//! # NLU Corpus Loader
//!
//! Reads the YAML training corpus:
//!
//! ```yaml
//! nlu:
//!   - intent: car/navigate
//!     examples: |
//!       - 导航去[新浪总部](location)
//!       - 带我去[公司](location)
//! ```
//!
//! Entries that are not intent blocks (synonyms, lookups, ...) are skipped.

use std::path::Path;

use serde_yaml::Value;
use tracing::{debug, info};

use crate::error::{JointNluError, Result};
use crate::parser::annotation::AnnotationParser;
use crate::types::ParsedExample;

/// One intent block: the intent name and its raw, still-annotated utterances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRecord {
    pub intent: String,
    pub utterances: Vec<String>,
}

/// The intent blocks of a corpus, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    pub records: Vec<IntentRecord>,
}

impl Corpus {
    /// Load and parse a corpus file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let corpus = Self::from_yaml_str(&content)?;
        info!(
            path = %path.display(),
            intents = corpus.records.len(),
            utterances = corpus.utterance_count(),
            "loaded corpus"
        );
        Ok(corpus)
    }

    /// Parse a corpus from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(content)?;
        let items = root
            .get("nlu")
            .and_then(Value::as_sequence)
            .ok_or_else(|| JointNluError::Corpus("missing `nlu` sequence".into()))?;

        let mut records = Vec::new();
        for item in items {
            let Some(intent) = item.get("intent").and_then(Value::as_str) else {
                continue;
            };
            let Some(examples) = item.get("examples").and_then(Value::as_str) else {
                debug!(intent, "intent block without examples");
                continue;
            };
            records.push(IntentRecord {
                intent: intent_name(intent).to_string(),
                utterances: split_examples(examples),
            });
        }

        Ok(Self { records })
    }

    /// Total number of raw utterances across all intents.
    pub fn utterance_count(&self) -> usize {
        self.records.iter().map(|r| r.utterances.len()).sum()
    }

    /// Parse every utterance into clean text, intent and entity spans.
    pub fn parse_examples(&self, parser: &AnnotationParser) -> Vec<ParsedExample> {
        let examples: Vec<ParsedExample> = self
            .records
            .iter()
            .flat_map(|record| {
                record
                    .utterances
                    .iter()
                    .map(|raw| parser.parse(raw, &record.intent))
            })
            .collect();

        let malformed: usize = examples.iter().map(|e| e.malformed).sum();
        if malformed > 0 {
            debug!(malformed, "annotations dropped while parsing the corpus");
        }
        examples
    }
}

/// Strip the namespace from an identifier like `car/navigate`.
pub fn intent_name(identifier: &str) -> &str {
    match identifier.split_once('/') {
        Some((_, name)) => name.split('/').next().unwrap_or(name),
        None => identifier,
    }
}

/// Split a Rasa-style examples block into its `- ` prefixed utterances.
pub fn split_examples(block: &str) -> Vec<String> {
    block
        .lines()
        .map(str::trim)
        .map(|line| line.strip_prefix("- ").or_else(|| line.strip_prefix('-')).unwrap_or(line))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
