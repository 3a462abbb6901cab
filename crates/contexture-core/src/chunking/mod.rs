//! Text decomposition: hierarchical chunking and sentence detection.
//!
//! Two structures are derived from every document at build time:
//!
//! - a chunk tree following the configured size ladder ([`hierarchy`]),
//!   retrieved at the leaves and merged upward by the auto-merging resolver;
//! - a flat sentence sequence ([`sentence`]), retrieved per sentence and
//!   expanded to windows by the window resolver.
//!
//! Both report exact byte spans into the source document. Downstream
//! overlap and content-preservation guarantees are checked against those
//! spans, so the splitters never fabricate or drop text.
//!
//! # Why split before embedding?
//!
//! Boundary-aware pieces (sentences, paragraphs) embed better than
//! arbitrary byte ranges, and retrieval results stay readable.

pub mod hierarchy;
pub mod sentence;
pub mod sizer;

pub use hierarchy::{chunk_hierarchy, RawChunk};
pub use sentence::{split_sentences, window_range, SentenceSeg};
pub use sizer::{CharSizer, EstimatedTokenSizer};

#[cfg(feature = "hf-tokenizer")]
pub use sizer::HfTokenizerSizer;
