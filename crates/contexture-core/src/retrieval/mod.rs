//! Retrieval strategies and context resolution.
//!
//! The pipeline is built from small pure stages over an immutable store:
//!
//! - `retriever`: exact top-k cosine scan over a unit pool
//! - `merge`: auto-merging resolver, siblings collapse into parents
//! - `window`: sentence hits widen to their build-time windows
//! - `rerank`: judge-scored reordering with graceful pass-through
//! - `engine`: the [`ContextEngine`] façade wiring stages into the three
//!   strategies ([`EngineKind::Direct`], [`EngineKind::SentenceWindow`],
//!   [`EngineKind::AutoMerging`])
//!
//! Every stage is deterministic given its inputs; the only nondeterminism
//! in a query is whatever the external capabilities introduce.

pub mod engine;
pub mod merge;
pub mod rerank;
pub mod retriever;
pub mod window;

pub use engine::{ContextEngine, EngineAnswer, EngineConfig, EngineKind, QueryOutcome};
pub use merge::{auto_merge, resolved_spans, ResolvedUnit};
pub use rerank::rerank_spans;
pub use retriever::{cosine_similarity, top_k_by_similarity};
pub use window::resolve_windows;
