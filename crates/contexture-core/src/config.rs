//! Build and retrieval configuration.
//!
//! This module holds the default constants used across the workspace and the
//! validated parameter structs handed to the corpus builder and the engine
//! façade. Validation happens once, up front: a bad parameter is a
//! [`ConfigError`] before any document is touched, never a silent correction.
//!
//! # Usage
//!
//! ```
//! use contexture_core::config::{ChunkingParams, RetrievalParams};
//!
//! let chunking = ChunkingParams::default();
//! chunking.validate().expect("defaults are valid");
//!
//! let retrieval = RetrievalParams {
//!     top_k: 12,
//!     ..RetrievalParams::default()
//! };
//! retrieval.validate().expect("top_k of 12 is valid");
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Default Constants
// =============================================================================

/// Default hierarchical chunk-size ladder, largest first.
///
/// Three levels: root passages sized for generation context, mid-level
/// sections, and leaf chunks small enough for precise retrieval. Sizes are
/// interpreted per [`SizeMeasure`].
pub const DEFAULT_CHUNK_SIZES: [usize; 3] = [2048, 512, 128];

/// Default sentence-window radius.
///
/// A radius of 3 expands a retrieved sentence to up to 7 sentences
/// (2w + 1), enough surrounding discourse to make a bare claim readable
/// without ballooning the prompt.
pub const DEFAULT_WINDOW_RADIUS: usize = 3;

/// Default retrieval breadth before any resolution or reranking.
pub const DEFAULT_TOP_K: usize = 8;

/// Default post-rerank truncation.
pub const DEFAULT_TOP_N: usize = 4;

/// Default auto-merge coverage threshold.
///
/// Half of a parent's children must be independently retrieved before the
/// parent replaces them. 0.5 keeps single stray hits from pulling in whole
/// sections while still merging genuinely dense evidence.
pub const DEFAULT_MERGE_THRESHOLD: f32 = 0.5;

/// Default per-call deadline for external capability calls.
pub const DEFAULT_CAPABILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Approximate characters per token for English prose.
///
/// Used by the estimated token sizer when no exact tokenizer is configured.
/// English text averages ~4 characters per token with most tokenizers; CJK
/// and code skew lower.
pub const CHARS_PER_TOKEN_ESTIMATE: usize = 4;

// =============================================================================
// Size Measure
// =============================================================================

/// How chunk-size numbers are interpreted.
///
/// The measure is fixed for a whole build; it participates in the corpus
/// fingerprint, so snapshots built under one measure never masquerade as
/// another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizeMeasure {
    /// Sizes are character counts.
    Chars,
    /// Sizes are token counts, estimated at [`CHARS_PER_TOKEN_ESTIMATE`]
    /// chars/token (exact when the `hf-tokenizer` feature supplies a
    /// tokenizer).
    #[default]
    Tokens,
}

// =============================================================================
// Parameter Structs
// =============================================================================

/// Hierarchical chunking parameters, fixed for a whole build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingParams {
    /// Target sizes per level, strictly decreasing, largest (root) first.
    pub sizes: Vec<usize>,
    /// Unit the sizes are expressed in.
    pub measure: SizeMeasure,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            sizes: DEFAULT_CHUNK_SIZES.to_vec(),
            measure: SizeMeasure::default(),
        }
    }
}

impl ChunkingParams {
    /// Checks the size ladder: non-empty, positive, strictly decreasing.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the offending level or pair. A
    /// non-decreasing ladder is never silently reordered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sizes.is_empty() {
            return Err(ConfigError::EmptyChunkSizes);
        }
        for (level, &size) in self.sizes.iter().enumerate() {
            if size == 0 {
                return Err(ConfigError::ChunkSizeZero { level });
            }
        }
        for pair in self.sizes.windows(2) {
            if pair[1] >= pair[0] {
                return Err(ConfigError::ChunkSizesNotDecreasing {
                    previous: pair[0],
                    current: pair[1],
                });
            }
        }
        Ok(())
    }

    /// Number of hierarchy levels this ladder produces.
    pub fn depth(&self) -> usize {
        self.sizes.len()
    }
}

/// Sentence-window parameters.
///
/// The radius is baked into the store at build time; changing it means
/// rebuilding, which the fingerprint enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowParams {
    /// Neighborhood radius w. A sentence at ordinal i gets the window
    /// [i - w, i + w] clamped to document bounds; w = 0 degenerates to the
    /// sentence itself.
    pub radius: usize,
}

impl Default for WindowParams {
    fn default() -> Self {
        Self {
            radius: DEFAULT_WINDOW_RADIUS,
        }
    }
}

/// Query-time retrieval parameters, shared by all engine kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalParams {
    /// Candidates fetched by the similarity retriever.
    pub top_k: usize,
    /// Candidates kept after reranking.
    pub top_n: usize,
    /// Auto-merge coverage threshold in (0, 1].
    pub merge_threshold: f32,
    /// Minimum relevance a best span must reach before the engine answers;
    /// `None` disables the guardrail.
    pub min_relevance: Option<f32>,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            top_n: DEFAULT_TOP_N,
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            min_relevance: None,
        }
    }
}

impl RetrievalParams {
    /// Checks retrieval bounds and threshold ranges.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for `top_k == 0`, `top_n == 0`, a merge
    /// threshold outside (0, 1], or a guardrail outside [0, 1].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }
        if self.top_n == 0 {
            return Err(ConfigError::InvalidTopN(self.top_n));
        }
        if !(self.merge_threshold > 0.0 && self.merge_threshold <= 1.0) {
            return Err(ConfigError::InvalidMergeThreshold(self.merge_threshold));
        }
        if let Some(min) = self.min_relevance {
            if !(0.0..=1.0).contains(&min) {
                return Err(ConfigError::InvalidMinRelevance(min));
            }
        }
        Ok(())
    }
}

/// Build-time parameters that shape the unit store.
///
/// These (and nothing else) feed the corpus fingerprint together with the
/// document texts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BuildParams {
    /// Hierarchy ladder.
    pub chunking: ChunkingParams,
    /// Sentence-window radius.
    pub window: WindowParams,
}

impl BuildParams {
    /// Validates all build-time parameters.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chunk_sizes_strictly_decrease() {
        ChunkingParams::default()
            .validate()
            .expect("default ladder must validate");
    }

    #[test]
    fn test_non_decreasing_ladder_is_rejected() {
        let params = ChunkingParams {
            sizes: vec![512, 512, 128],
            measure: SizeMeasure::Tokens,
        };
        let err = params.validate().expect_err("equal adjacent sizes");
        assert!(
            matches!(err, ConfigError::ChunkSizesNotDecreasing { previous: 512, current: 512 }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn test_increasing_ladder_is_rejected() {
        let params = ChunkingParams {
            sizes: vec![128, 512],
            measure: SizeMeasure::Chars,
        };
        assert!(params.validate().is_err(), "increasing ladder must fail");
    }

    #[test]
    fn test_zero_size_is_rejected_with_level() {
        let params = ChunkingParams {
            sizes: vec![2048, 0],
            measure: SizeMeasure::Tokens,
        };
        let err = params.validate().expect_err("zero size");
        assert!(matches!(err, ConfigError::ChunkSizeZero { level: 1 }));
    }

    #[test]
    fn test_empty_ladder_is_rejected() {
        let params = ChunkingParams {
            sizes: vec![],
            measure: SizeMeasure::Tokens,
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::EmptyChunkSizes)
        ));
    }

    #[test]
    fn test_zero_window_radius_is_valid() {
        // w = 0 means "window is the sentence itself", a defined edge case,
        // not a configuration error.
        let params = BuildParams {
            window: WindowParams { radius: 0 },
            ..BuildParams::default()
        };
        params.validate().expect("w = 0 must validate");
    }

    #[test]
    fn test_zero_top_k_is_rejected() {
        let params = RetrievalParams {
            top_k: 0,
            ..RetrievalParams::default()
        };
        assert!(matches!(params.validate(), Err(ConfigError::InvalidTopK(0))));
    }

    #[test]
    fn test_merge_threshold_bounds() {
        for bad in [0.0f32, -0.1, 1.01] {
            let params = RetrievalParams {
                merge_threshold: bad,
                ..RetrievalParams::default()
            };
            assert!(
                params.validate().is_err(),
                "threshold {bad} must be rejected"
            );
        }
        let edge = RetrievalParams {
            merge_threshold: 1.0,
            ..RetrievalParams::default()
        };
        edge.validate().expect("threshold 1.0 is the closed edge");
    }

    #[test]
    fn test_guardrail_range_is_checked() {
        let params = RetrievalParams {
            min_relevance: Some(1.5),
            ..RetrievalParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvalidMinRelevance(_))
        ));
    }
}
