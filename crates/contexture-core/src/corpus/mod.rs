//! Corpus construction, storage, and persistence.
//!
//! A corpus is a set of documents decomposed into retrieval units: a chunk
//! hierarchy per document (coarse parents over fine leaves) and a flat
//! sentence sequence with per-sentence context windows. Everything lives in
//! a [`UnitStore`], an append-only arena addressed by [`UnitId`].
//!
//! # Architecture
//!
//! - `types`: ids, unit records, spans, and the snapshot manifest
//! - `store`: the arena plus the leaf and sentence retrieval pools
//! - `build`: [`CorpusBuilder`], documents in, verified store out
//! - `persist`: fingerprinted JSON snapshots with schema versioning
//!
//! # Usage
//!
//! ```ignore
//! use contexture_core::capability::offline::HashEmbedder;
//! use contexture_core::config::BuildParams;
//! use contexture_core::corpus::CorpusBuilder;
//! use std::sync::Arc;
//!
//! let builder = CorpusBuilder::new(BuildParams::default(), Arc::new(HashEmbedder::default()))?;
//! let corpus = vec![("guide.md".to_string(), markdown_text)];
//! let store = builder.load_or_build(&corpus, cache_dir).await?;
//! ```
//!
//! # Invariants
//!
//! - Parent and child links always mirror each other; [`UnitStore::verify_consistency`]
//!   checks every edge and builds refuse to return an inconsistent store.
//! - Leaf texts concatenate back to the exact document text.
//! - Identical corpus content, order, and parameters produce identical
//!   stores, including unit numbering. The fingerprint stands for all three.

pub mod build;
pub mod persist;
pub mod store;
pub mod types;

pub use build::CorpusBuilder;
pub use persist::corpus_fingerprint;
pub use store::UnitStore;
pub use types::{
    ByteSpan, ContextSpan, DocumentId, DocumentRecord, ScoredUnit, StoreManifest, Unit, UnitId,
    UnitKind,
};
