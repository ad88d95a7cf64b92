//! Parsed training examples and batching.

use std::path::Path;

use anyhow::Context;
use jointnlu_core::parser::{AnnotationParser, Corpus};
use jointnlu_core::types::ParsedExample;
use oorandom::Rand64;
use tracing::info;

/// All parsed utterances of one corpus split.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    examples: Vec<ParsedExample>,
}

impl Dataset {
    pub fn new(examples: Vec<ParsedExample>) -> Self {
        Self { examples }
    }

    pub fn from_corpus(corpus: &Corpus, parser: &AnnotationParser) -> Self {
        Self::new(corpus.parse_examples(parser))
    }

    /// Read and parse a YAML corpus file.
    pub fn load<P: AsRef<Path>>(path: P, parser: &AnnotationParser) -> anyhow::Result<(Corpus, Self)> {
        let path = path.as_ref();
        let corpus = Corpus::from_path(path).with_context(|| format!("failed to load corpus {}", path.display()))?;
        let dataset = Self::from_corpus(&corpus, parser);
        info!(
            path = %path.display(),
            examples = dataset.len(),
            malformed = dataset.malformed(),
            "loaded dataset"
        );
        Ok((corpus, dataset))
    }

    pub fn examples(&self) -> &[ParsedExample] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Annotations dropped while parsing.
    pub fn malformed(&self) -> usize {
        self.examples.iter().map(|e| e.malformed).sum()
    }

    /// Batches in corpus order; the last one may be short.
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = &[ParsedExample]> {
        self.examples.chunks(batch_size.max(1))
    }

    /// Batches over a fresh Fisher-Yates permutation drawn from `rng`.
    pub fn shuffled_batches(&self, batch_size: usize, rng: &mut Rand64) -> Vec<Vec<ParsedExample>> {
        let mut order: Vec<usize> = (0..self.examples.len()).collect();
        for i in (1..order.len()).rev() {
            let j = rng.rand_range(0..(i as u64 + 1)) as usize;
            order.swap(i, j);
        }

        order
            .chunks(batch_size.max(1))
            .map(|chunk| chunk.iter().map(|&i| self.examples[i].clone()).collect())
            .collect()
    }
}
