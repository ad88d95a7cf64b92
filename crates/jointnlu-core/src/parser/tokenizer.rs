//! # Subword Tokenization
//!
//! The supervision encoder only needs three things from a tokenizer: the
//! token ids, the token strings, and which characters of the input each token
//! covers. [`SubwordTokenizer`] is that seam. [`HfTokenizer`] implements it
//! over a Hugging Face `tokenizer.json`, or over a BERT `vocab.txt` with the
//! standard uncased BERT pipeline (clean-up, CJK splitting, lowercasing and
//! accent stripping, then WordPiece).

use std::collections::HashMap;
use std::path::Path;

use tokenizers::models::wordpiece::{WordPiece, WordPieceBuilder};
use tokenizers::normalizers::bert::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::processors::bert::BertProcessing;
use tokenizers::{Tokenizer as HfInner, TruncationParams};
use tracing::{info, warn};

use crate::error::{JointNluError, Result};
use crate::types::CharRange;

/// Padding id; the attention mask is derived from `id != PAD_ID`.
pub const PAD_ID: u32 = 0;

/// Default maximum sequence length, special tokens included.
pub const DEFAULT_MAX_LEN: usize = 256;

/// Tokenizer output for one utterance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenizedText {
    /// Token strings, special tokens included.
    pub tokens: Vec<String>,
    /// Vocabulary ids, aligned with `tokens`.
    pub ids: Vec<u32>,
    /// Characters covered by each token; `None` for special tokens.
    pub offsets: Vec<Option<CharRange>>,
}

impl TokenizedText {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Text -> tokens + character-offset mapping.
pub trait SubwordTokenizer: Send + Sync {
    /// Tokenize `text`, truncated to the tokenizer's maximum length.
    fn encode(&self, text: &str) -> Result<TokenizedText>;

    /// Size of the id space.
    fn vocab_size(&self) -> usize;
}

fn tokenizer_error(e: impl std::fmt::Display) -> JointNluError {
    JointNluError::Tokenizer(e.to_string())
}

/// Hugging Face tokenizer truncating to a fixed length.
pub struct HfTokenizer {
    inner: HfInner,
}

impl HfTokenizer {
    /// Wrap `inner`, truncating encodings to `max_len` tokens.
    pub fn new(mut inner: HfInner, max_len: usize) -> Result<Self> {
        inner
            .with_truncation(Some(TruncationParams {
                max_length: max_len.max(2),
                ..Default::default()
            }))
            .map_err(tokenizer_error)?;
        if inner.token_to_id("[PAD]").is_some_and(|id| id != PAD_ID) {
            warn!("[PAD] is not id {PAD_ID}; attention masks will be wrong");
        }
        Ok(Self { inner })
    }

    /// Load a `tokenizer.json`.
    pub fn from_file<P: AsRef<Path>>(path: P, max_len: usize) -> Result<Self> {
        let inner = HfInner::from_file(path.as_ref()).map_err(tokenizer_error)?;
        Self::new(inner, max_len)
    }

    /// Uncased BERT WordPiece tokenizer over a `vocab.txt` (line `n` is id `n`).
    pub fn from_vocab_file<P: AsRef<Path>>(path: P, max_len: usize) -> Result<Self> {
        let path = path.as_ref();
        let path = path
            .to_str()
            .ok_or_else(|| JointNluError::Tokenizer(format!("non UTF-8 path {}", path.display())))?;
        Self::bert(WordPiece::from_file(path), max_len)
    }

    /// Uncased BERT WordPiece tokenizer over tokens listed in id order.
    pub fn from_tokens<I, S>(tokens: I, max_len: usize) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = HashMap::new();
        for (id, token) in tokens.into_iter().enumerate() {
            vocab.entry(token.into()).or_insert(id as u32);
        }
        Self::bert(WordPiece::builder().vocab(vocab), max_len)
    }

    fn bert(model: WordPieceBuilder, max_len: usize) -> Result<Self> {
        let model = model.unk_token("[UNK]".into()).build().map_err(tokenizer_error)?;
        let mut inner = HfInner::new(model);

        let special = |name: &str| {
            inner
                .token_to_id(name)
                .ok_or_else(|| JointNluError::Tokenizer(format!("vocabulary lacks {name}")))
        };
        let cls_id = special("[CLS]")?;
        let sep_id = special("[SEP]")?;
        special("[UNK]")?;

        inner.with_normalizer(BertNormalizer::default());
        inner.with_pre_tokenizer(BertPreTokenizer);
        inner.with_post_processor(BertProcessing::new(("[SEP]".into(), sep_id), ("[CLS]".into(), cls_id)));
        Self::new(inner, max_len)
    }

    pub fn inner(&self) -> &HfInner {
        &self.inner
    }
}

impl SubwordTokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<TokenizedText> {
        let encoding = self.inner.encode_char_offsets(text, true).map_err(tokenizer_error)?;

        let special = encoding.get_special_tokens_mask();
        let offsets = encoding
            .get_offsets()
            .iter()
            .zip(special)
            .map(|(&(start, end), &is_special)| {
                (is_special == 0 && end > start).then(|| CharRange::new(start, end - 1))
            })
            .collect();

        Ok(TokenizedText {
            tokens: encoding.get_tokens().to_vec(),
            ids: encoding.get_ids().to_vec(),
            offsets,
        })
    }

    fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}

/// Load the tokenizer shipped with an encoder directory.
///
/// Prefers `tokenizer.json`; falls back to BERT WordPiece over `vocab.txt`.
pub fn load_from_dir<P: AsRef<Path>>(dir: P, max_len: usize) -> Result<Box<dyn SubwordTokenizer>> {
    let dir = dir.as_ref();
    let json = dir.join("tokenizer.json");
    if json.exists() {
        info!(path = %json.display(), "loading tokenizer");
        return Ok(Box::new(HfTokenizer::from_file(&json, max_len)?));
    }

    let vocab = dir.join("vocab.txt");
    if vocab.exists() {
        info!(path = %vocab.display(), "loading WordPiece vocabulary");
        return Ok(Box::new(HfTokenizer::from_vocab_file(&vocab, max_len)?));
    }

    Err(JointNluError::Tokenizer(format!(
        "no tokenizer.json or vocab.txt in {}",
        dir.display()
    )))
}
