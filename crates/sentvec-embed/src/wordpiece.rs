//! BERT basic + WordPiece tokenization from a plain `vocab.txt`.
use std::path::Path;

use anyhow::{anyhow, Result};
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::bert::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::{ModelWrapper, NormalizerWrapper, PreTokenizerWrapper, Tokenizer};

pub struct WordPieceTokenizer {
    inner: Tokenizer,
}

impl WordPieceTokenizer {
    /// `lowercase` also strips accents, matching uncased BERT vocabularies.
    pub fn from_vocab(vocab: &Path, lowercase: bool) -> Result<Self> {
        let vocab_str = vocab
            .to_str()
            .ok_or_else(|| anyhow!("vocab path {} is not valid UTF-8", vocab.display()))?;
        let model = WordPiece::from_file(vocab_str)
            .unk_token("[UNK]".to_string())
            .build()
            .map_err(|e| anyhow!("Failed to load vocab {}: {}", vocab.display(), e))?;
        let mut inner = Tokenizer::new(ModelWrapper::WordPiece(model));
        inner.with_normalizer(NormalizerWrapper::BertNormalizer(BertNormalizer::new(true, true, None, lowercase)));
        inner.with_pre_tokenizer(PreTokenizerWrapper::BertPreTokenizer(BertPreTokenizer));
        Ok(Self { inner })
    }

    pub fn tokenize(&self, sentence: &str) -> Result<Vec<String>> {
        let enc = self
            .inner
            .encode(sentence, false)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        Ok(enc.get_tokens().to_vec())
    }

    /// Tokens joined by single spaces, ready for a whitespace-tokenized pipeline.
    pub fn tokenize_line(&self, sentence: &str) -> Result<String> {
        Ok(self.tokenize(sentence)?.join(" "))
    }
}
