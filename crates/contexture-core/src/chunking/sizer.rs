//! Chunk size measurement for text-splitter integration.
//!
//! The hierarchical chunker is generic over a [`ChunkSizer`], so the same
//! splitting code serves character sizing, estimated token sizing, and (with
//! the `hf-tokenizer` feature) exact token sizing.

use crate::config::CHARS_PER_TOKEN_ESTIMATE;
use text_splitter::ChunkSizer;

/// Sizes chunks by Unicode scalar count.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharSizer;

impl ChunkSizer for CharSizer {
    fn size(&self, chunk: &str) -> usize {
        chunk.chars().count()
    }
}

/// Sizes chunks by an estimated token count, no tokenizer required.
///
/// English prose averages [`CHARS_PER_TOKEN_ESTIMATE`] characters per token;
/// averaging the character estimate with the whitespace word count tracks
/// real tokenizers within roughly ±20%. Good enough for chunk boundaries,
/// where exactness buys nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatedTokenSizer;

impl ChunkSizer for EstimatedTokenSizer {
    fn size(&self, chunk: &str) -> usize {
        let char_estimate = chunk.len() / CHARS_PER_TOKEN_ESTIMATE;
        let word_count = chunk.split_whitespace().count();
        (char_estimate + word_count) / 2
    }
}

/// Exact token sizing backed by a HuggingFace tokenizer.
///
/// The tokenizer used for sizing should be the one the embedding service
/// uses, otherwise size limits no longer predict what the embedder sees.
#[cfg(feature = "hf-tokenizer")]
#[derive(Clone, Copy)]
pub struct HfTokenizerSizer<'a> {
    /// Tokenizer shared with the embedding configuration.
    pub tokenizer: &'a tokenizers::Tokenizer,
}

#[cfg(feature = "hf-tokenizer")]
impl ChunkSizer for HfTokenizerSizer<'_> {
    fn size(&self, chunk: &str) -> usize {
        self.tokenizer
            .encode(chunk, false)
            .map(|encoding| encoding.len())
            .unwrap_or(0)
    }
}
