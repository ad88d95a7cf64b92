//! # Label Vocabulary
//!
//! Closed, first-seen-ordered id <-> label tables for intents and entity
//! types. Built once from the full corpus and then shared read-only by
//! collation, the model heads, evaluation and inference.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{JointNluError, Result};
use crate::parser::corpus::Corpus;

/// Intent and entity-type label tables.
///
/// Intent ids are 0-based. Entity type ids are 1-based, because id 0 is the
/// padding class of the span classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelVocabulary {
    intents: Vec<String>,
    entity_types: Vec<String>,
}

impl LabelVocabulary {
    /// Build the vocabulary in one pass over the corpus.
    ///
    /// Entity types are every parenthesized group found in the raw
    /// utterances, appended the first time they are seen.
    pub fn from_corpus(corpus: &Corpus) -> Result<Self> {
        let re_group = Regex::new(r"\((.*?)\)")?;
        let mut vocab = Self::default();

        for record in &corpus.records {
            push_unique(&mut vocab.intents, &record.intent);
            for utterance in &record.utterances {
                for caps in re_group.captures_iter(utterance) {
                    if let Some(group) = caps.get(1) {
                        push_unique(&mut vocab.entity_types, group.as_str());
                    }
                }
            }
        }

        Ok(vocab)
    }

    /// Build a vocabulary from explicit label lists (duplicates are dropped).
    pub fn from_labels<I, E>(intents: I, entity_types: E) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let mut vocab = Self::default();
        for intent in intents {
            push_unique(&mut vocab.intents, intent.as_ref());
        }
        for entity_type in entity_types {
            push_unique(&mut vocab.entity_types, entity_type.as_ref());
        }
        vocab
    }

    pub fn intents(&self) -> &[String] {
        &self.intents
    }

    pub fn entity_types(&self) -> &[String] {
        &self.entity_types
    }

    pub fn num_intents(&self) -> usize {
        self.intents.len()
    }

    /// Number of real entity types (excluding the padding class).
    pub fn num_entity_types(&self) -> usize {
        self.entity_types.len()
    }

    /// Width of the span classifier output: entity types plus padding.
    pub fn num_span_classes(&self) -> usize {
        self.entity_types.len() + 1
    }

    pub fn intent_id(&self, label: &str) -> Result<u32> {
        self.intents
            .iter()
            .position(|l| l == label)
            .map(|i| i as u32)
            .ok_or_else(|| JointNluError::UnknownLabel {
                kind: "intent",
                label: label.to_string(),
            })
    }

    pub fn intent_label(&self, id: u32) -> Option<&str> {
        self.intents.get(id as usize).map(String::as_str)
    }

    /// 1-based id of an entity type.
    pub fn entity_type_id(&self, label: &str) -> Result<u32> {
        self.entity_types
            .iter()
            .position(|l| l == label)
            .map(|i| i as u32 + 1)
            .ok_or_else(|| JointNluError::UnknownLabel {
                kind: "entity",
                label: label.to_string(),
            })
    }

    /// Label for a 1-based entity type id; `None` for the padding class.
    pub fn entity_type_label(&self, id: u32) -> Option<&str> {
        let index = (id as usize).checked_sub(1)?;
        self.entity_types.get(index).map(String::as_str)
    }
}

fn push_unique(labels: &mut Vec<String>, label: &str) {
    if !labels.iter().any(|l| l == label) {
        labels.push(label.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORPUS: &str = r#"
nlu:
  - intent: car/navigate
    examples: |
      - 导航去[新浪总部](location)
      - 从[公司](location)到[家](home)
  - intent: car/play
    examples: |
      - 播放[晴天](song)
  - intent: car/navigate
    examples: |
      - 去[机场](location)
"#;

    #[test]
    fn test_first_seen_order() {
        let corpus = Corpus::from_yaml_str(CORPUS).unwrap();
        let vocab = LabelVocabulary::from_corpus(&corpus).unwrap();
        assert_eq!(vocab.intents(), ["navigate", "play"]);
        assert_eq!(vocab.entity_types(), ["location", "home", "song"]);
    }

    #[test]
    fn test_rebuild_is_identical() {
        let corpus = Corpus::from_yaml_str(CORPUS).unwrap();
        let first = LabelVocabulary::from_corpus(&corpus).unwrap();
        let second = LabelVocabulary::from_corpus(&corpus).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_entity_ids_are_one_based() {
        let vocab = LabelVocabulary::from_labels(["a"], ["location", "home"]);
        assert_eq!(vocab.entity_type_id("location").unwrap(), 1);
        assert_eq!(vocab.entity_type_id("home").unwrap(), 2);
        assert_eq!(vocab.entity_type_label(0), None);
        assert_eq!(vocab.entity_type_label(2), Some("home"));
        assert_eq!(vocab.num_span_classes(), 3);
    }

    #[test]
    fn test_unknown_labels() {
        let vocab = LabelVocabulary::from_labels(["a"], ["x"]);
        assert!(matches!(
            vocab.intent_id("b"),
            Err(JointNluError::UnknownLabel { kind: "intent", .. })
        ));
        assert!(vocab.entity_type_id("y").is_err());
        assert_eq!(vocab.intent_label(1), None);
    }
}
