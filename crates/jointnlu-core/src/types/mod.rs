pub mod example;
pub mod span;

pub use example::ParsedExample;
pub use span::{CharRange, EntitySpan, EntityTuple, TokenSpan};
