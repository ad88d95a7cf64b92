//! # Supervision Encoding
//!
//! Turns parsed examples into model targets: token ids, BIO tags, token
//! spans with 1-based type ids, and an intent id. Entity spans are aligned to
//! tokens by exact character boundary; a span whose first or last character
//! is not a token boundary is dropped from supervision and counted.
//!
//! Collation is a pure function of the examples plus the shared tokenizer
//! and vocabulary, so batches may be encoded independently.

use std::collections::{BTreeSet, HashMap};

use candle_core::{Device, Tensor};
use tracing::debug;

use crate::error::Result;
use crate::parser::bio_tags::BioTag;
use crate::parser::tokenizer::{PAD_ID, SubwordTokenizer};
use crate::types::{CharRange, EntitySpan, EntityTuple, ParsedExample, TokenSpan};
use crate::vocab::LabelVocabulary;

/// Character-boundary lookup tables for one tokenized utterance.
#[derive(Debug, Clone, Default)]
pub struct BoundaryIndex {
    starts: HashMap<usize, usize>,
    ends: HashMap<usize, usize>,
}

impl BoundaryIndex {
    /// Index the first and last character of every non-special token.
    pub fn from_offsets(offsets: &[Option<CharRange>]) -> Self {
        let mut index = Self::default();
        for (token, range) in offsets.iter().enumerate() {
            if let Some(range) = range {
                index.starts.insert(range.first, token);
                index.ends.insert(range.last, token);
            }
        }
        index
    }

    /// Token bounds of `span`, or `None` when either end misses a boundary.
    pub fn align(&self, span: &EntitySpan) -> Option<(usize, usize)> {
        let start = *self.starts.get(&span.start)?;
        let end = *self.ends.get(&span.end)?;
        (start <= end).then_some((start, end))
    }
}

/// Targets for one utterance, unpadded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedExample {
    pub token_ids: Vec<u32>,
    pub tags: Vec<BioTag>,
    /// Aligned gold spans; empty when every span was dropped.
    pub spans: Vec<TokenSpan>,
    pub intent_id: u32,
    /// Per-token character ranges, kept for recovering entity text.
    pub offsets: Vec<Option<CharRange>>,
    /// Entity spans that did not align to token boundaries.
    pub dropped_spans: usize,
}

/// Device tensors for one batch, padded to rectangular shape with 0.
pub struct BatchTensors {
    /// `[batch, seq_len]` u32
    pub token_ids: Tensor,
    /// `[batch, seq_len]` u32 BIO indices
    pub tags: Tensor,
    /// `[batch, num_spans, 2]` u32 `(start, end)`; `(0, 0)` is padding
    pub spans: Tensor,
    /// `[batch, num_spans]` u32; 0 is padding
    pub span_types: Tensor,
    /// `[batch]` u32
    pub intents: Tensor,
}

/// A collated batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedBatch {
    pub examples: Vec<EncodedExample>,
    pub dropped_spans: usize,
}

impl EncodedBatch {
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Longest token sequence in the batch.
    pub fn seq_len(&self) -> usize {
        self.examples.iter().map(|e| e.token_ids.len()).max().unwrap_or(0)
    }

    pub fn intent_ids(&self) -> Vec<u32> {
        self.examples.iter().map(|e| e.intent_id).collect()
    }

    /// Gold entities as `(sample, start, end, type_id)` tuples.
    pub fn gold_tuples(&self) -> BTreeSet<EntityTuple> {
        self.examples
            .iter()
            .enumerate()
            .flat_map(|(sample, e)| e.spans.iter().map(move |s| EntityTuple::new(sample, s, s.type_id)))
            .collect()
    }

    pub fn to_tensors(&self, device: &Device) -> Result<BatchTensors> {
        let batch = self.examples.len();
        let seq_len = self.seq_len().max(1);

        let mut token_ids = Vec::with_capacity(batch * seq_len);
        let mut tags = Vec::with_capacity(batch * seq_len);
        for example in &self.examples {
            let pad = seq_len - example.token_ids.len();
            token_ids.extend_from_slice(&example.token_ids);
            token_ids.extend(std::iter::repeat_n(PAD_ID, pad));
            tags.extend(example.tags.iter().map(|t| t.index() as u32));
            tags.extend(std::iter::repeat_n(BioTag::Outside.index() as u32, pad));
        }

        let bounds: Vec<Vec<(usize, usize)>> = self
            .examples
            .iter()
            .map(|e| e.spans.iter().map(|s| (s.start, s.end)).collect())
            .collect();
        let spans = span_tensor(&bounds, device)?;

        let num_spans = spans.dim(1)?;
        let mut span_types = Vec::with_capacity(batch * num_spans);
        for example in &self.examples {
            span_types.extend(example.spans.iter().map(|s| s.type_id));
            span_types.extend(std::iter::repeat_n(0, num_spans - example.spans.len()));
        }

        Ok(BatchTensors {
            token_ids: Tensor::from_vec(token_ids, (batch, seq_len), device)?,
            tags: Tensor::from_vec(tags, (batch, seq_len), device)?,
            spans,
            span_types: Tensor::from_vec(span_types, (batch, num_spans), device)?,
            intents: Tensor::from_vec(self.intent_ids(), batch, device)?,
        })
    }
}

/// `[batch, num_spans, 2]` u32 tensor of span bounds.
///
/// Rows are padded with `(0, 0)` to the longest row, and `num_spans` is at
/// least 1 so batches without any entity keep a valid shape.
pub fn span_tensor(rows: &[Vec<(usize, usize)>], device: &Device) -> Result<Tensor> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let mut flat = Vec::with_capacity(rows.len() * width * 2);
    for row in rows {
        for &(start, end) in row {
            flat.push(start as u32);
            flat.push(end as u32);
        }
        flat.extend(std::iter::repeat_n(0, (width - row.len()) * 2));
    }
    Ok(Tensor::from_vec(flat, (rows.len(), width, 2), device)?)
}

/// Encodes parsed examples against a tokenizer and a fixed vocabulary.
pub struct SupervisionEncoder<'a> {
    tokenizer: &'a dyn SubwordTokenizer,
    vocab: &'a LabelVocabulary,
}

impl<'a> SupervisionEncoder<'a> {
    pub fn new(tokenizer: &'a dyn SubwordTokenizer, vocab: &'a LabelVocabulary) -> Self {
        Self { tokenizer, vocab }
    }

    /// Encode one example. Unknown intent or entity labels are an error.
    pub fn encode_example(&self, example: &ParsedExample) -> Result<EncodedExample> {
        let tokenized = self.tokenizer.encode(&example.text)?;
        let intent_id = self.vocab.intent_id(&example.intent)?;
        let index = BoundaryIndex::from_offsets(&tokenized.offsets);

        let mut tags = vec![BioTag::Outside; tokenized.len()];
        let mut spans = Vec::with_capacity(example.spans.len());
        let mut dropped_spans = 0;

        for entity in &example.spans {
            let type_id = self.vocab.entity_type_id(&entity.label)?;
            let Some((start, end)) = index.align(entity) else {
                dropped_spans += 1;
                debug!(
                    text = %example.text,
                    start = entity.start,
                    end = entity.end,
                    label = %entity.label,
                    "span does not align to token boundaries; dropped"
                );
                continue;
            };

            tags[start] = BioTag::Begin;
            for tag in &mut tags[start + 1..=end] {
                *tag = BioTag::Inside;
            }
            spans.push(TokenSpan::new(start, end, type_id));
        }

        Ok(EncodedExample {
            token_ids: tokenized.ids,
            tags,
            spans,
            intent_id,
            offsets: tokenized.offsets,
            dropped_spans,
        })
    }

    pub fn encode_batch(&self, examples: &[ParsedExample]) -> Result<EncodedBatch> {
        let examples = examples
            .iter()
            .map(|e| self.encode_example(e))
            .collect::<Result<Vec<_>>>()?;
        let dropped_spans = examples.iter().map(|e| e.dropped_spans).sum();
        if dropped_spans > 0 {
            debug!(dropped_spans, batch = examples.len(), "collated batch with dropped spans");
        }

        Ok(EncodedBatch {
            examples,
            dropped_spans,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JointNluError;
    use crate::parser::spans::spans_from_tags;
    use crate::parser::tokenizer::{DEFAULT_MAX_LEN, HfTokenizer, TokenizedText};

    /// Whitespace word tokenizer; every vocabulary lookup maps to id 5.
    struct WordTokenizer;

    impl SubwordTokenizer for WordTokenizer {
        fn encode(&self, text: &str) -> Result<TokenizedText> {
            let mut out = TokenizedText::default();
            out.tokens.push("[CLS]".into());
            out.ids.push(2);
            out.offsets.push(None);

            let mut word_start = None;
            for (i, c) in text.chars().chain(Some(' ')).enumerate() {
                match (c.is_whitespace(), word_start) {
                    (false, None) => word_start = Some(i),
                    (true, Some(start)) => {
                        out.tokens.push(text.chars().skip(start).take(i - start).collect());
                        out.ids.push(5);
                        out.offsets.push(Some(CharRange::new(start, i - 1)));
                        word_start = None;
                    }
                    _ => {}
                }
            }

            out.tokens.push("[SEP]".into());
            out.ids.push(3);
            out.offsets.push(None);
            Ok(out)
        }

        fn vocab_size(&self) -> usize {
            6
        }
    }

    fn chinese_tokenizer(max_len: usize) -> HfTokenizer {
        HfTokenizer::from_tokens(
            ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "导", "航", "去", "新", "浪", "总", "部"],
            max_len,
        )
        .unwrap()
    }

    fn vocab() -> LabelVocabulary {
        LabelVocabulary::from_labels(["navigate", "chat"], ["location", "person"])
    }

    #[test]
    fn test_encode_aligned_span() {
        let tokenizer = chinese_tokenizer(DEFAULT_MAX_LEN);
        let vocab = vocab();
        let encoder = SupervisionEncoder::new(&tokenizer, &vocab);
        let example = ParsedExample::new("导航去新浪总部", "navigate").with_span(EntitySpan::new(3, 6, "location"));

        let encoded = encoder.encode_example(&example).unwrap();
        use BioTag::{Begin as B, Inside as I, Outside as O};
        assert_eq!(encoded.tags, vec![O, O, O, O, B, I, I, I, O]);
        assert_eq!(encoded.spans, vec![TokenSpan::new(4, 7, 1)]);
        assert_eq!(encoded.intent_id, 0);
        assert_eq!(encoded.dropped_spans, 0);
    }

    #[test]
    fn test_misaligned_spans_leave_no_marks() {
        let vocab = vocab();
        let encoder = SupervisionEncoder::new(&WordTokenizer, &vocab);
        // go(0,1) to(3,4) new(6,8) york(10,13) now(15,17)
        let text = "go to new york now";
        let example = ParsedExample::new(text, "chat")
            .with_span(EntitySpan::new(7, 13, "location"))
            .with_span(EntitySpan::new(10, 15, "location"));

        let encoded = encoder.encode_example(&example).unwrap();
        assert!(encoded.spans.is_empty());
        assert!(encoded.tags.iter().all(|t| *t == BioTag::Outside));
        assert_eq!(encoded.dropped_spans, 2);
    }

    #[test]
    fn test_only_misaligned_span_is_dropped() {
        let vocab = vocab();
        let encoder = SupervisionEncoder::new(&WordTokenizer, &vocab);
        let example = ParsedExample::new("go to new york now", "chat")
            .with_span(EntitySpan::new(6, 13, "location"))
            .with_span(EntitySpan::new(16, 17, "person"));

        let encoded = encoder.encode_example(&example).unwrap();
        assert_eq!(encoded.spans, vec![TokenSpan::new(3, 4, 1)]);
        assert_eq!(encoded.tags[3], BioTag::Begin);
        assert_eq!(encoded.tags[4], BioTag::Inside);
        assert_eq!(encoded.tags[5], BioTag::Outside);
        assert_eq!(encoded.dropped_spans, 1);
    }

    #[test]
    fn test_truncated_span_is_dropped() {
        let tokenizer = chinese_tokenizer(5);
        let vocab = vocab();
        let encoder = SupervisionEncoder::new(&tokenizer, &vocab);
        let example = ParsedExample::new("导航去新浪总部", "navigate").with_span(EntitySpan::new(3, 6, "location"));

        let encoded = encoder.encode_example(&example).unwrap();
        assert_eq!(encoded.token_ids.len(), 5);
        assert!(encoded.spans.is_empty());
        assert_eq!(encoded.dropped_spans, 1);
    }

    #[test]
    fn test_gold_tags_round_trip_to_spans() {
        let vocab = vocab();
        let encoder = SupervisionEncoder::new(&WordTokenizer, &vocab);
        let example = ParsedExample::new("ask bob about new york today", "chat")
            .with_span(EntitySpan::new(4, 6, "person"))
            .with_span(EntitySpan::new(14, 21, "location"));

        let encoded = encoder.encode_example(&example).unwrap();
        let decoded: Vec<(usize, usize)> = spans_from_tags(&encoded.tags)
            .into_iter()
            .map(|b| (b.start, b.end))
            .collect();
        let gold: Vec<(usize, usize)> = encoded.spans.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(gold, vec![(2, 2), (4, 5)]);
        assert_eq!(decoded, gold);
    }

    #[test]
    fn test_unknown_labels_fail() {
        let tokenizer = chinese_tokenizer(DEFAULT_MAX_LEN);
        let vocab = vocab();
        let encoder = SupervisionEncoder::new(&tokenizer, &vocab);

        let err = encoder
            .encode_example(&ParsedExample::new("导航", "weather"))
            .unwrap_err();
        assert!(matches!(err, JointNluError::UnknownLabel { kind: "intent", .. }));

        let err = encoder
            .encode_example(&ParsedExample::new("导航", "navigate").with_span(EntitySpan::new(0, 1, "time")))
            .unwrap_err();
        assert!(matches!(err, JointNluError::UnknownLabel { kind: "entity", .. }));
    }

    #[test]
    fn test_batch_tensors_are_rectangular() {
        let tokenizer = chinese_tokenizer(DEFAULT_MAX_LEN);
        let vocab = vocab();
        let encoder = SupervisionEncoder::new(&tokenizer, &vocab);
        let batch = encoder
            .encode_batch(&[
                ParsedExample::new("导航去新浪总部", "navigate").with_span(EntitySpan::new(3, 6, "location")),
                ParsedExample::new("导航", "chat"),
            ])
            .unwrap();

        let tensors = batch.to_tensors(&Device::Cpu).unwrap();
        assert_eq!(tensors.token_ids.dims(), &[2, 9]);
        assert_eq!(tensors.tags.dims(), &[2, 9]);
        assert_eq!(tensors.spans.dims(), &[2, 1, 2]);
        assert_eq!(tensors.span_types.dims(), &[2, 1]);

        let ids: Vec<Vec<u32>> = tensors.token_ids.to_vec2().unwrap();
        assert_eq!(ids[1], vec![2, 4, 5, 3, 0, 0, 0, 0, 0]);
        let spans: Vec<Vec<Vec<u32>>> = tensors.spans.to_vec3().unwrap();
        assert_eq!(spans, vec![vec![vec![4, 7]], vec![vec![0, 0]]]);
        let types: Vec<Vec<u32>> = tensors.span_types.to_vec2().unwrap();
        assert_eq!(types, vec![vec![1], vec![0]]);
        assert_eq!(tensors.intents.to_vec1::<u32>().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_gold_tuples_skip_empty_examples() {
        let tokenizer = chinese_tokenizer(DEFAULT_MAX_LEN);
        let vocab = vocab();
        let encoder = SupervisionEncoder::new(&tokenizer, &vocab);
        let batch = encoder
            .encode_batch(&[
                ParsedExample::new("导航", "chat"),
                ParsedExample::new("导航去新浪总部", "navigate").with_span(EntitySpan::new(3, 6, "location")),
            ])
            .unwrap();

        let tuples: Vec<EntityTuple> = batch.gold_tuples().into_iter().collect();
        assert_eq!(tuples, vec![EntityTuple::new(1, &TokenSpan::new(4, 7, 1), 1)]);
    }
}
