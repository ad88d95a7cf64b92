//! # Inline Annotation Parser
//!
//! Turns a bracket-annotated utterance such as `导航去[新浪总部](location)`
//! into clean text plus character-addressed entity spans.

use regex::Regex;
use tracing::debug;

use crate::error::Result;
use crate::types::{EntitySpan, ParsedExample};

/// Parser for `[entity text](entity_type)` markup.
pub struct AnnotationParser {
    re_annotation: Regex,
}

impl AnnotationParser {
    /// Constructs a new `AnnotationParser` with its pattern pre-compiled.
    ///
    /// # Errors
    ///
    /// Returns `JointNluError::RegexError` if the pattern fails to compile
    /// (should never happen with the static pattern defined here).
    pub fn new() -> Result<Self> {
        Ok(Self {
            re_annotation: Regex::new(r"\[([^\]]+)\]\(([^)]+)\)")?,
        })
    }

    /// Parse one raw utterance belonging to `intent`.
    ///
    /// Entity texts are searched in the clean text left to right, each search
    /// starting where the previous match ended, so a repeated surface form
    /// binds to successive occurrences. An annotation whose text cannot be
    /// found is counted in [`ParsedExample::malformed`] and produces no span.
    pub fn parse(&self, raw: &str, intent: &str) -> ParsedExample {
        let raw = raw.trim();
        let annotations: Vec<(&str, &str)> = self
            .re_annotation
            .captures_iter(raw)
            .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
            .collect();

        let text = self.re_annotation.replace_all(raw, "$1").replace('\n', "");

        let mut spans = Vec::with_capacity(annotations.len());
        let mut malformed = 0;
        let mut byte_cursor = 0;

        for (entity_text, entity_type) in annotations {
            let Some(found) = text[byte_cursor..].find(entity_text) else {
                debug!(entity = entity_text, utterance = %text, "annotation text not found");
                malformed += 1;
                continue;
            };
            let byte_start = byte_cursor + found;
            let byte_end = byte_start + entity_text.len();

            let start = text[..byte_start].chars().count();
            let len = entity_text.chars().count();
            spans.push(EntitySpan::new(start, start + len - 1, entity_type));

            byte_cursor = byte_end;
        }

        ParsedExample {
            text,
            intent: intent.to_string(),
            spans,
            malformed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> AnnotationParser {
        AnnotationParser::new().unwrap()
    }

    #[test]
    fn test_single_annotation() {
        let ex = parser().parse("导航去[新浪总部](location)", "navigate");
        assert_eq!(ex.text, "导航去新浪总部");
        assert_eq!(ex.intent, "navigate");
        assert_eq!(ex.spans.len(), 1);
        assert_eq!(ex.spans[0].label, "location");
        assert_eq!(ex.spans[0].surface(&ex.text), Some("新浪总部"));
        assert_eq!(ex.malformed, 0);
    }

    #[test]
    fn test_no_annotations() {
        let ex = parser().parse("打开空调", "ac_on");
        assert_eq!(ex.text, "打开空调");
        assert!(ex.spans.is_empty());
    }

    #[test]
    fn test_repeated_surface_binds_successive_occurrences() {
        let ex = parser().parse("from [home](place) to [home](place)", "route");
        assert_eq!(ex.text, "from home to home");
        assert_eq!(ex.spans.len(), 2);
        assert_eq!(ex.spans[0], EntitySpan::new(5, 8, "place"));
        assert_eq!(ex.spans[1], EntitySpan::new(13, 16, "place"));
    }

    #[test]
    fn test_multiple_types_in_order() {
        let ex = parser().parse("把[温度](attr)调到[二十六度](value)", "set");
        assert_eq!(ex.text, "把温度调到二十六度");
        let surfaces: Vec<&str> = ex.spans.iter().map(|s| s.surface(&ex.text).unwrap()).collect();
        assert_eq!(surfaces, ["温度", "二十六度"]);
        assert_eq!(ex.spans[0].label, "attr");
        assert_eq!(ex.spans[1].label, "value");
    }

    #[test]
    fn test_repeated_substring_inside_longer_entity() {
        let ex = parser().parse("[abc](x) [b](y)", "t");
        assert_eq!(ex.text, "abc b");
        assert_eq!(ex.spans[0], EntitySpan::new(0, 2, "x"));
        assert_eq!(ex.spans[1], EntitySpan::new(4, 4, "y"));
    }

    #[test]
    fn test_unlocatable_annotation_is_counted_not_emitted() {
        // Line breaks are removed from the clean text, so this entity text
        // no longer occurs in it.
        let ex = parser().parse("go [a\nb](x) now [c](y)", "t");
        assert_eq!(ex.text, "go ab now c");
        assert_eq!(ex.malformed, 1);
        assert_eq!(ex.spans, vec![EntitySpan::new(10, 10, "y")]);
    }

    #[test]
    fn test_trims_whitespace() {
        let ex = parser().parse("  hello [world](thing)\n", "greet");
        assert_eq!(ex.text, "hello world");
        assert_eq!(ex.spans[0], EntitySpan::new(6, 10, "thing"));
    }
}
