// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-length WordPiece tokenization for the embedding model.
//!
//! Every call produces exactly `max_sequence_length` ids laid out as
//! `[CLS] content [SEP] [PAD]...`, with a matching attention mask.

use std::path::Path;

use edgerag_config::model::EmbeddingConfig;
use edgerag_core::EdgeRagError;
use tokenizers::Tokenizer;
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tracing::{debug, warn};

/// Token ids and attention mask for one input text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSequence {
    pub ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
}

impl TokenSequence {
    /// Number of unmasked positions, boundary markers included.
    pub fn real_len(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }
}

/// Boundary ids and length limits applied around the WordPiece vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceLayout {
    pub max_len: usize,
    pub vocab_size: u32,
    pub unk_id: u32,
    pub cls_id: u32,
    pub sep_id: u32,
    pub pad_id: u32,
}

impl From<&EmbeddingConfig> for SequenceLayout {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            max_len: config.max_sequence_length,
            vocab_size: config.vocab_size,
            unk_id: config.unk_id,
            cls_id: config.cls_id,
            sep_id: config.sep_id,
            pad_id: config.pad_id,
        }
    }
}

/// WordPiece tokenizer producing fixed-length sequences.
pub struct TextTokenizer {
    inner: Tokenizer,
    layout: SequenceLayout,
}

impl TextTokenizer {
    /// Loads a vocabulary from disk.
    ///
    /// A `.json` path is read as a serialized `tokenizers` pipeline; anything
    /// else is treated as a one-token-per-line `vocab.txt`.
    pub fn from_file(path: &Path, config: &EmbeddingConfig) -> Result<Self, EdgeRagError> {
        let init_err = |message: String| EdgeRagError::Initialization {
            component: "tokenizer".to_string(),
            message,
        };

        if !path.exists() {
            return Err(init_err(format!("vocabulary not found at {}", path.display())));
        }

        let inner = if path.extension().is_some_and(|ext| ext == "json") {
            Tokenizer::from_file(path)
                .map_err(|e| init_err(format!("failed to read {}: {e}", path.display())))?
        } else {
            let vocab = path
                .to_str()
                .ok_or_else(|| init_err(format!("non UTF-8 path {}", path.display())))?;
            let wordpiece = WordPiece::from_file(vocab)
                .unk_token("[UNK]".to_string())
                .build()
                .map_err(|e| init_err(format!("failed to read {}: {e}", path.display())))?;
            let mut tokenizer = Tokenizer::new(wordpiece);
            tokenizer
                .with_normalizer(Some(BertNormalizer::new(
                    true,
                    true,
                    None,
                    config.lowercase,
                )))
                .with_pre_tokenizer(Some(BertPreTokenizer));
            tokenizer
        };

        debug!(
            path = %path.display(),
            vocab = inner.get_vocab_size(false),
            "tokenizer loaded"
        );

        Ok(Self::new(inner, SequenceLayout::from(config)))
    }

    /// Wraps an already-built tokenizer.
    pub fn new(inner: Tokenizer, layout: SequenceLayout) -> Self {
        Self { inner, layout }
    }

    pub fn layout(&self) -> SequenceLayout {
        self.layout
    }

    /// Tokenizes `text` into a fixed-length sequence. Never fails.
    ///
    /// Content longer than `max_len - 2` tokens is truncated. Ids outside the
    /// vocabulary are replaced with `unk_id`. If the underlying tokenizer
    /// errors, the result is the empty `[CLS] [SEP]` sequence.
    pub fn tokenize(&self, text: &str) -> TokenSequence {
        let content: Vec<u32> = match self.inner.encode(text, false) {
            Ok(encoding) => encoding.get_ids().to_vec(),
            Err(e) => {
                warn!(error = %e, "tokenization failed, using empty sequence");
                Vec::new()
            }
        };
        self.frame(&content)
    }

    /// Lays out content ids between the boundary markers and pads to `max_len`.
    fn frame(&self, content: &[u32]) -> TokenSequence {
        let SequenceLayout {
            max_len,
            vocab_size,
            unk_id,
            cls_id,
            sep_id,
            pad_id,
        } = self.layout;

        let budget = max_len.saturating_sub(2);
        let mut ids = Vec::with_capacity(max_len);
        ids.push(i64::from(cls_id));
        ids.extend(content.iter().take(budget).map(|&id| {
            if id < vocab_size {
                i64::from(id)
            } else {
                i64::from(unk_id)
            }
        }));
        ids.push(i64::from(sep_id));

        let real = ids.len();
        ids.resize(max_len.max(real), i64::from(pad_id));

        let mut attention_mask = vec![1i64; real];
        attention_mask.resize(ids.len(), 0);

        TokenSequence {
            ids,
            attention_mask,
        }
    }
}
