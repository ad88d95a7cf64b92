use serde::{Deserialize, Serialize};

/// An entity occurrence addressed by character offsets into a clean utterance.
///
/// Offsets count Unicode scalar values, not bytes, and `end` is inclusive:
/// it is the index of the span's last character.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntitySpan {
    /// Index of the first character of the span.
    pub start: usize,
    /// Index of the last character of the span.
    pub end: usize,
    /// Entity type name as written in the annotation.
    pub label: String,
}

impl EntitySpan {
    pub fn new(start: usize, end: usize, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
        }
    }

    /// The covered substring of `text`.
    pub fn surface<'a>(&self, text: &'a str) -> Option<&'a str> {
        let mut indices = text.char_indices().map(|(i, _)| i).chain(Some(text.len()));
        let from = indices.nth(self.start)?;
        let to = indices.nth(self.end.checked_sub(self.start)?)?;
        text.get(from..to)
    }
}

/// An entity occurrence re-addressed into subword-token index space.
///
/// `type_id` is 1-based; 0 is reserved for the padding class and never
/// appears on a real span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenSpan {
    /// Index of the first token.
    pub start: usize,
    /// Index of the last token (inclusive).
    pub end: usize,
    /// 1-based entity type id.
    pub type_id: u32,
}

impl TokenSpan {
    pub fn new(start: usize, end: usize, type_id: u32) -> Self {
        debug_assert!(end >= start);
        Self {
            start,
            end,
            type_id,
        }
    }
}

/// An inclusive range of character indices covered by one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharRange {
    pub first: usize,
    pub last: usize,
}

impl CharRange {
    pub fn new(first: usize, last: usize) -> Self {
        Self { first, last }
    }
}

/// A scored entity identity: `(sample_index, start, end, type_id)`.
///
/// Ordering and hashing are structural so predicted and gold tuples can be
/// compared as sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityTuple {
    pub sample: usize,
    pub start: usize,
    pub end: usize,
    pub type_id: u32,
}

impl EntityTuple {
    pub fn new(sample: usize, span: &TokenSpan, type_id: u32) -> Self {
        Self {
            sample,
            start: span.start,
            end: span.end,
            type_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_uses_char_offsets() {
        let span = EntitySpan::new(3, 6, "location");
        assert_eq!(span.surface("导航去新浪总部"), Some("新浪总部"));
    }

    #[test]
    fn test_surface_out_of_range() {
        let span = EntitySpan::new(2, 9, "location");
        assert_eq!(span.surface("abc"), None);
    }
}
