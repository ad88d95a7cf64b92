pub mod annotation;
pub mod bio_tags;
pub mod corpus;
pub mod spans;
pub mod tokenizer;

pub use annotation::AnnotationParser;
pub use bio_tags::BioTag;
pub use corpus::{Corpus, IntentRecord};
pub use spans::{SpanBounds, spans_from_indices, spans_from_tags};
pub use tokenizer::{
    DEFAULT_MAX_LEN, HfTokenizer, PAD_ID, SubwordTokenizer, TokenizedText, load_from_dir,
};
