//! # BIO Tags for Entity Span Detection
//!
//! The sequence-tagging head only finds *where* entities are; their types are
//! assigned afterwards by the span classifier. The tag set is therefore the
//! untyped Begin-Inside-Outside scheme.

use std::fmt;

/// BIO tags for labeling subword tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BioTag {
    /// Outside any entity (also used for padding and special tokens).
    #[default]
    Outside,
    /// First token of an entity.
    Begin,
    /// Continuation token of an entity.
    Inside,
}

impl BioTag {
    /// Total number of distinct tags.
    pub const NUM_TAGS: usize = 3;

    /// Get all possible tags in index order.
    pub fn all_tags() -> &'static [BioTag] {
        &[BioTag::Outside, BioTag::Begin, BioTag::Inside]
    }

    /// Get the tag index for tensor operations.
    pub fn index(&self) -> usize {
        match self {
            BioTag::Outside => 0,
            BioTag::Begin => 1,
            BioTag::Inside => 2,
        }
    }

    /// Get tag from index.
    pub fn from_index(idx: usize) -> Option<Self> {
        match idx {
            0 => Some(BioTag::Outside),
            1 => Some(BioTag::Begin),
            2 => Some(BioTag::Inside),
            _ => None,
        }
    }

    pub fn is_begin(&self) -> bool {
        matches!(self, BioTag::Begin)
    }

    pub fn is_inside(&self) -> bool {
        matches!(self, BioTag::Inside)
    }

    /// Check if transitioning from `from` tag to `to` tag is valid.
    ///
    /// An `I` may only continue a `B` or another `I`.
    pub fn is_valid_transition(from: BioTag, to: BioTag) -> bool {
        !matches!((from, to), (BioTag::Outside, BioTag::Inside))
    }

    /// Check if a sequence may begin with this tag.
    pub fn is_valid_start(tag: BioTag) -> bool {
        !tag.is_inside()
    }
}

impl fmt::Display for BioTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BioTag::Outside => write!(f, "O"),
            BioTag::Begin => write!(f, "B"),
            BioTag::Inside => write!(f, "I"),
        }
    }
}
