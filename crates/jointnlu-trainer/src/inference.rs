//! Single-utterance decoding with label and surface-text recovery.

use std::fmt;

use candle_core::Device;
use jointnlu_core::Encoder;
use jointnlu_core::model::{JointModel, pad_token_ids};
use jointnlu_core::parser::SubwordTokenizer;
use jointnlu_core::types::{CharRange, TokenSpan};
use jointnlu_core::vocab::LabelVocabulary;
use tracing::debug;

use crate::config::TrainingConfig;
use crate::trainer::Trainer;

#[derive(Debug, Clone, PartialEq)]
pub struct EntityMention {
    /// Covered characters of the input utterance.
    pub text: String,
    pub label: String,
    pub confidence: f32,
    pub span: TokenSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    pub intent: String,
    pub intent_confidence: f32,
    pub entities: Vec<EntityMention>,
}

impl fmt::Display for Interpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "intent: {} ({:.4})", self.intent, self.intent_confidence)?;
        if self.entities.is_empty() {
            return write!(f, "entities: none");
        }
        write!(f, "entities:")?;
        for entity in &self.entities {
            write!(f, "\n  {} [{}] ({:.4})", entity.text, entity.label, entity.confidence)?;
        }
        Ok(())
    }
}

/// Decode `text` and map ids back to labels and characters.
pub fn interpret<E: Encoder>(
    model: &JointModel<E>,
    tokenizer: &dyn SubwordTokenizer,
    vocab: &LabelVocabulary,
    text: &str,
    device: &Device,
) -> anyhow::Result<Interpretation> {
    let tokenized = tokenizer.encode(text)?;
    let token_ids = pad_token_ids(std::slice::from_ref(&tokenized.ids), device)?;
    let prediction = model.predict(&token_ids)?;

    let intent = prediction
        .intents
        .first()
        .ok_or_else(|| anyhow::anyhow!("model returned no prediction"))?;
    let intent_label = vocab
        .intent_label(intent.id)
        .ok_or_else(|| anyhow::anyhow!("intent id {} outside the vocabulary", intent.id))?;

    let mut entities = Vec::new();
    for detected in prediction.entities.first().into_iter().flatten() {
        let Some(label) = vocab.entity_type_label(detected.span.type_id) else {
            debug!(start = detected.span.start, end = detected.span.end, "span typed as padding; skipped");
            continue;
        };
        entities.push(EntityMention {
            text: surface_text(text, &tokenized.offsets, &detected.span),
            label: label.to_string(),
            confidence: detected.confidence,
            span: detected.span,
        });
    }

    Ok(Interpretation {
        intent: intent_label.to_string(),
        intent_confidence: intent.confidence,
        entities,
    })
}

/// Characters from the first token's first character to the last token's
/// last character; empty when either token has no character range.
pub fn surface_text(text: &str, offsets: &[Option<CharRange>], span: &TokenSpan) -> String {
    let first = offsets.get(span.start).copied().flatten();
    let last = offsets.get(span.end).copied().flatten();
    match (first, last) {
        (Some(first), Some(last)) if last.last >= first.first => text
            .chars()
            .skip(first.first)
            .take(last.last - first.first + 1)
            .collect(),
        _ => String::new(),
    }
}

/// Load the best checkpoint and print the interpretation of the demo text.
pub fn run_demo(config: TrainingConfig, text: Option<String>) -> anyhow::Result<()> {
    let text = text.unwrap_or_else(|| config.demo_text.clone());
    let checkpoint = config.checkpoint_path.clone();

    let (mut trainer, _, _) = Trainer::from_config(config)?;
    println!("intents: {:?}", trainer.vocab().intents());
    println!("entity types: {:?}", trainer.vocab().entity_types());
    trainer.load_checkpoint(&checkpoint)?;

    let result = interpret(trainer.model(), trainer.tokenizer(), trainer.vocab(), &text, trainer.device())?;
    println!("{text}");
    println!("{result}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_text_uses_char_offsets() {
        let offsets = vec![
            None,
            Some(CharRange::new(0, 0)),
            Some(CharRange::new(1, 1)),
            Some(CharRange::new(2, 2)),
            Some(CharRange::new(3, 3)),
            Some(CharRange::new(4, 4)),
            Some(CharRange::new(5, 5)),
            Some(CharRange::new(6, 6)),
            None,
        ];
        let span = TokenSpan::new(4, 7, 1);
        assert_eq!(surface_text("导航去新浪总部", &offsets, &span), "新浪总部");
    }

    #[test]
    fn test_surface_text_of_special_token_is_empty() {
        let offsets = vec![None, Some(CharRange::new(0, 1)), None];
        assert_eq!(surface_text("ab", &offsets, &TokenSpan::new(1, 2, 1)), "");
        assert_eq!(surface_text("ab", &offsets, &TokenSpan::new(1, 1, 1)), "ab");
    }

    #[test]
    fn test_display() {
        let result = Interpretation {
            intent: "navigate".into(),
            intent_confidence: 0.9,
            entities: vec![EntityMention {
                text: "新浪总部".into(),
                label: "location".into(),
                confidence: 0.8,
                span: TokenSpan::new(4, 7, 1),
            }],
        };
        assert_eq!(
            result.to_string(),
            "intent: navigate (0.9000)\nentities:\n  新浪总部 [location] (0.8000)"
        );
    }
}
