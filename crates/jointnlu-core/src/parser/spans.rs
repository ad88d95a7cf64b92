//! # Span Assembly
//!
//! Converts a decoded BIO tag path into token spans with a two-state machine.
//!
//! | state   | `B`               | `I`          | `O`     |
//! |---------|-------------------|--------------|---------|
//! | Outside | open `[j, j]`     | ignored      | -       |
//! | Inside  | close, open `[j, j]` | extend to `j` | close |
//!
//! `I` while Outside is tolerated rather than rejected: the CRF decoder never
//! emits it, but gold or hand-built paths may.

use crate::parser::bio_tags::BioTag;

/// Token-index bounds of one detected span (both inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanBounds {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Outside,
    Inside(SpanBounds),
}

/// Assemble spans from a tag path, in left-to-right order.
pub fn spans_from_tags(tags: &[BioTag]) -> Vec<SpanBounds> {
    let mut spans = Vec::new();
    let mut state = ScanState::Outside;

    for (j, tag) in tags.iter().enumerate() {
        state = match (state, tag) {
            (ScanState::Inside(open), BioTag::Begin) => {
                spans.push(open);
                ScanState::Inside(SpanBounds { start: j, end: j })
            }
            (ScanState::Outside, BioTag::Begin) => ScanState::Inside(SpanBounds { start: j, end: j }),
            (ScanState::Inside(open), BioTag::Inside) => ScanState::Inside(SpanBounds { end: j, ..open }),
            (ScanState::Inside(open), BioTag::Outside) => {
                spans.push(open);
                ScanState::Outside
            }
            (ScanState::Outside, _) => ScanState::Outside,
        };
    }

    if let ScanState::Inside(open) = state {
        spans.push(open);
    }
    spans
}

/// Like [`spans_from_tags`], over raw tag indices. Unknown indices count as `O`.
pub fn spans_from_indices(tags: &[u32]) -> Vec<SpanBounds> {
    let tags: Vec<BioTag> = tags
        .iter()
        .map(|&t| BioTag::from_index(t as usize).unwrap_or_default())
        .collect();
    spans_from_tags(&tags)
}
