//! Core data model: units, documents, spans, and snapshot manifests.
//!
//! The unit graph is an arena: parent/child relationships are stored as
//! [`UnitId`]s, never as owning references, which keeps the tree cycle-free
//! in ownership terms and makes the whole store serializable as plain data.

use crate::config::BuildParams;
use serde::{Deserialize, Serialize};

/// Returns the current Unix timestamp (seconds since UNIX_EPOCH).
///
/// If the system time is before UNIX_EPOCH (extremely unlikely), returns 0
/// instead of panicking.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Unique identifier of a unit within one store.
///
/// Ids are assigned sequentially by the store during a build, so two builds
/// of the same corpus with the same parameters number their units
/// identically. That determinism is what lets a snapshot fingerprint stand
/// in for the whole store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct UnitId(u64);

impl UnitId {
    /// Creates a UnitId from a raw u64 value.
    ///
    /// Useful for deserialization or testing. The store is the only
    /// component that should mint fresh ids.
    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value of this ID.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a document within one store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DocumentId(u64);

impl DocumentId {
    /// Creates a DocumentId from a raw u64 value.
    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value of this ID.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What role a unit plays in retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// One sentence from the flat sentence sequence (SWR pool).
    Sentence,
    /// Deepest-level hierarchy chunk (Direct/AMR retrieval pool).
    LeafChunk,
    /// Non-leaf hierarchy chunk; enters results only via merging.
    ParentChunk,
}

/// Half-open byte range `[start, end)` into a document's text.
///
/// Spans are the ground truth for the no-overlap guarantees: two output
/// spans overlap exactly when their byte ranges intersect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteSpan {
    /// First byte of the range.
    pub start: usize,
    /// One past the last byte of the range.
    pub end: usize,
}

impl ByteSpan {
    /// Creates a span. `start <= end` is the caller's responsibility.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// True when the span covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True when the two spans share at least one byte.
    pub fn overlaps(&self, other: &ByteSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when `other` lies entirely within this span.
    pub fn contains(&self, other: &ByteSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Atomic retrievable item: a sentence, a leaf chunk, or a parent chunk.
///
/// Units are immutable once the store hands them out. All relationships are
/// ids into the same store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    /// Store-unique identifier.
    pub id: UnitId,
    /// Owning document. Units are never shared across documents.
    pub doc: DocumentId,
    /// Role of this unit.
    pub kind: UnitKind,
    /// Depth in the hierarchy; roots are level 0. Sentences, which live
    /// outside the hierarchy, are level 0 as well.
    pub level: usize,
    /// Position among siblings (chunks) or within the document (sentences).
    pub ordinal: usize,
    /// Exact text of this unit.
    pub text: String,
    /// Byte range of `text` within the owning document.
    pub span: ByteSpan,
    /// Embedding vector; present for retrievable units (sentences and leaf
    /// chunks), absent for parent chunks, which are never ranked directly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// For sentences only: ids of the sentences forming the local
    /// neighborhood `[i - w, i + w]`, in document order, this one included.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<Vec<UnitId>>,
    /// Parent chunk; absent for hierarchy roots and for sentences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<UnitId>,
    /// Children in document order; empty for sentences and leaf chunks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_ids: Vec<UnitId>,
}

impl Unit {
    /// True for hierarchy chunks with no parent.
    pub fn is_root(&self) -> bool {
        self.kind != UnitKind::Sentence && self.parent_id.is_none()
    }

    /// True when this unit can be ranked by the similarity retriever.
    pub fn is_retrievable(&self) -> bool {
        matches!(self.kind, UnitKind::Sentence | UnitKind::LeafChunk)
    }
}

/// A document together with the entry points into its derived units.
///
/// The unit arena itself lives in the store; a document records only its
/// text and the ordered roots of its two derived structures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Store-assigned identifier.
    pub id: DocumentId,
    /// External identifier from the corpus source (path, title, ...).
    pub source_id: String,
    /// Full original text.
    pub text: String,
    /// Hierarchy roots in document order (usually one, more when the
    /// document exceeds the root chunk size).
    pub root_ids: Vec<UnitId>,
    /// Sentence units in document order.
    pub sentence_ids: Vec<UnitId>,
}

/// One retrieval hit: a unit and its similarity (or rerank) score.
///
/// Scores order candidates; they are not comparable across engines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredUnit {
    /// The retrieved unit.
    pub id: UnitId,
    /// Ranking score; higher is better.
    pub score: f32,
}

impl ScoredUnit {
    /// Creates a scored unit.
    pub fn new(id: UnitId, score: f32) -> Self {
        Self { id, score }
    }
}

/// Final text block handed to generation.
///
/// For AMR this is one (possibly merged) unit's full text; for SWR it is a
/// window, possibly merged with overlapping neighbors. Spans from one
/// resolution never overlap in source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSpan {
    /// Document the text came from.
    pub doc: DocumentId,
    /// Units that contributed to this span, in document order.
    pub units: Vec<UnitId>,
    /// Assembled text.
    pub text: String,
    /// Byte range the span covers in the source document.
    pub span: ByteSpan,
    /// Best ranking score among contributing units.
    pub score: f32,
}

impl ContextSpan {
    /// Wraps a single unit's full text as one span.
    pub fn for_unit(unit: &Unit, score: f32) -> Self {
        Self {
            doc: unit.doc,
            units: vec![unit.id],
            text: unit.text.clone(),
            span: unit.span,
            score,
        }
    }
}

// ============================================================================
// Snapshot Manifest
// ============================================================================

/// Current schema version for the snapshot format.
///
/// Increment on breaking changes to the persisted layout.
/// - v1: manifest.json + units.json
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Manifest stored beside a unit-store snapshot.
///
/// The fingerprint binds the snapshot to one (corpus, build parameters)
/// pair; loading under any other pair is refused rather than silently
/// reinterpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreManifest {
    /// Schema version of this snapshot.
    pub schema_version: u32,
    /// Minimum schema version required to read this snapshot.
    pub min_compatible_version: u32,
    /// blake3 fingerprint over the ordered corpus and the build parameters.
    pub fingerprint: String,
    /// Parameters the store was built with.
    pub params: BuildParams,
    /// Number of documents in the store.
    pub document_count: usize,
    /// Number of units in the arena.
    pub unit_count: usize,
    /// Embedding dimension of retrievable units.
    pub embedding_dimension: usize,
    /// Unix timestamp when the snapshot was written.
    pub created_at: u64,
}

impl StoreManifest {
    /// Checks whether this snapshot can be read by the current build.
    pub fn is_compatible(&self) -> bool {
        CURRENT_SCHEMA_VERSION >= self.min_compatible_version
    }
}
