//! Error types for contexture-core.
//!
//! Errors are split by how they propagate:
//!
//! - [`ConfigError`] and [`IntegrityError`] are fatal. They are raised before
//!   or during a corpus build and abort it.
//! - [`CapabilityError`] is recoverable per call. Callers degrade (skip a
//!   rerank, record a metric as absent) and keep going.
//! - [`StoreError`] covers snapshot persistence.
//! - [`BuildError`] and [`EngineError`] are the umbrella types returned by
//!   the corpus builder and the query path.
//!
//! An insufficient-context outcome is deliberately not an error; it is a
//! variant of [`crate::retrieval::engine::QueryOutcome`].

use crate::corpus::types::UnitId;
use std::time::Duration;
use thiserror::Error;

/// Fatal parameter errors, detected before any work starts.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Chunk-size ladder must be strictly decreasing
    #[error("chunk sizes must be strictly decreasing: {previous} followed by {current}")]
    ChunkSizesNotDecreasing {
        /// Size at the earlier level
        previous: usize,
        /// Size at the later level
        current: usize,
    },
    /// Chunk-size ladder must be non-empty with positive entries
    #[error("chunk size at level {level} must be positive")]
    ChunkSizeZero {
        /// Hierarchy level of the offending entry
        level: usize,
    },
    /// No chunk sizes configured at all
    #[error("chunk size ladder is empty")]
    EmptyChunkSizes,
    /// Retrieval breadth must be at least one
    #[error("top_k must be >= 1, got {0}")]
    InvalidTopK(usize),
    /// Rerank truncation must be at least one
    #[error("top_n must be >= 1, got {0}")]
    InvalidTopN(usize),
    /// Merge threshold must lie in (0, 1]
    #[error("merge_threshold must be in (0, 1], got {0}")]
    InvalidMergeThreshold(f32),
    /// Relevance guardrail must lie in [0, 1]
    #[error("min_relevance must be in [0, 1], got {0}")]
    InvalidMinRelevance(f32),
}

/// Recoverable failures from external capabilities (embedder, generator,
/// judge).
///
/// These never abort a batch: the affected step degrades and the run
/// continues.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    /// The call did not complete within the configured deadline
    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        /// Which capability call timed out
        operation: &'static str,
        /// The configured per-call limit
        limit: Duration,
    },
    /// The capability answered, but the payload could not be interpreted
    #[error("malformed {operation} response: {detail}")]
    Malformed {
        /// Which capability call produced the response
        operation: &'static str,
        /// What could not be parsed
        detail: String,
    },
    /// The capability rejected the call or is not reachable
    #[error("capability unavailable: {0}")]
    Unavailable(String),
    /// Transport-level failure (connection, protocol)
    #[error("capability transport error: {0}")]
    Transport(String),
}

/// Fatal build-time failures: the unit graph fails bidirectional
/// parent/child consistency.
#[derive(Debug, Clone, Error)]
pub enum IntegrityError {
    /// A unit names a parent that does not exist
    #[error("unit {unit:?} references missing parent {parent:?}")]
    MissingParent {
        /// The child unit
        unit: UnitId,
        /// The dangling parent id
        parent: UnitId,
    },
    /// A unit names a child that does not exist
    #[error("unit {unit:?} references missing child {child:?}")]
    MissingChild {
        /// The parent unit
        unit: UnitId,
        /// The dangling child id
        child: UnitId,
    },
    /// A child's parent does not list it back
    #[error("unit {child:?} names parent {parent:?}, but the parent's child list omits it")]
    ParentLinkNotMirrored {
        /// The child unit
        child: UnitId,
        /// The parent it claims
        parent: UnitId,
    },
    /// A parent's child does not point back at it
    #[error("unit {parent:?} lists child {child:?}, but the child names parent {actual:?}")]
    ChildLinkNotMirrored {
        /// The parent unit
        parent: UnitId,
        /// The listed child
        child: UnitId,
        /// What the child actually names (None for roots)
        actual: Option<UnitId>,
    },
    /// A window refers to a unit that is not a sentence in the same document
    #[error("unit {unit:?} has window member {member:?} that is not a sentence of the same document")]
    InvalidWindowMember {
        /// The sentence owning the window
        unit: UnitId,
        /// The offending window member
        member: UnitId,
    },
    /// A window member's ordinal does not locate it in its document's
    /// sentence sequence
    #[error("unit {unit:?} has window member {member:?} whose ordinal {ordinal} does not index it in the document's sentence sequence")]
    WindowMemberNotIndexed {
        /// The sentence owning the window
        unit: UnitId,
        /// The offending window member
        member: UnitId,
        /// The ordinal recorded on the member
        ordinal: usize,
    },
}

/// Snapshot persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error while reading or writing a snapshot
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Snapshot (de)serialization error
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Snapshot was built from a different corpus or with different parameters
    #[error("fingerprint mismatch: snapshot {found}, expected {expected}")]
    FingerprintMismatch {
        /// Fingerprint recorded in the snapshot manifest
        found: String,
        /// Fingerprint of the requested corpus + parameters
        expected: String,
    },
    /// Snapshot schema is newer than this build understands
    #[error("snapshot schema v{found} is not supported (current: v{current})")]
    IncompatibleSchema {
        /// Version recorded in the manifest
        found: u32,
        /// Version this build writes
        current: u32,
    },
    /// Manifest present but snapshot payload missing, or vice versa
    #[error("incomplete snapshot: {0}")]
    Incomplete(String),
}

/// Umbrella error for corpus builds.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Invalid build parameters
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Unit graph failed consistency verification
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    /// Embedding the corpus failed outright
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    /// Snapshot load/save failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Umbrella error for query execution.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Query embedding failed; without a query vector nothing can run
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    /// The query string was empty
    #[error("query text is empty")]
    EmptyQuery,
}
