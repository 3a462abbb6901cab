//! Hierarchical chunking: one document, several nested granularities.
//!
//! Each level of the size ladder re-splits the chunks of the level above it,
//! using `text-splitter`'s boundary-aware splitting (paragraphs before
//! sentences before words before characters). Trimming is disabled so that
//! every level tiles its parent exactly: child byte spans partition the
//! parent span, and leaf texts concatenate back to the original document.
//! That exactness is what the no-overlap and content-preservation guarantees
//! stand on.

use crate::corpus::types::ByteSpan;
use text_splitter::{ChunkConfig, ChunkSizer, TextSplitter};

/// One chunk in the level-ordered flat layout produced by
/// [`chunk_hierarchy`].
///
/// Links are indices into the same vector; the corpus builder converts them
/// to store ids. Text is not duplicated here; slice the document by `span`.
#[derive(Debug, Clone)]
pub struct RawChunk {
    /// Hierarchy level, 0 for roots.
    pub level: usize,
    /// Position among siblings (or among roots at level 0).
    pub ordinal: usize,
    /// Absolute byte range in the document.
    pub span: ByteSpan,
    /// Index of the parent chunk, absent for roots.
    pub parent: Option<usize>,
    /// Indices of child chunks in document order.
    pub children: Vec<usize>,
}

/// Splits `text` into a chunk tree following the size ladder.
///
/// `sizes` must already be validated (non-empty, positive, strictly
/// decreasing); the corpus builder checks this before any splitting starts.
/// Returned chunks are ordered level by level, document order within each
/// level, so the deepest level (the leaves) forms a document-ordered
/// suffix.
///
/// A document shorter than `sizes[0]` simply yields a single root; deeper
/// levels still split it further. Whitespace-only documents yield nothing.
pub fn chunk_hierarchy<S: ChunkSizer + Copy>(
    text: &str,
    sizes: &[usize],
    sizer: S,
) -> Vec<RawChunk> {
    let mut chunks: Vec<RawChunk> = Vec::new();
    if text.trim().is_empty() || sizes.is_empty() {
        return chunks;
    }

    let mut frontier = split_segment(text, 0, sizes[0], sizer, 0, None, &mut chunks);

    for (level, &size) in sizes.iter().enumerate().skip(1) {
        let mut next_frontier = Vec::new();
        for &parent_idx in &frontier {
            let span = chunks[parent_idx].span;
            let segment = &text[span.start..span.end];
            let children = split_segment(
                segment,
                span.start,
                size,
                sizer,
                level,
                Some(parent_idx),
                &mut chunks,
            );
            next_frontier.extend_from_slice(&children);
            chunks[parent_idx].children = children;
        }
        frontier = next_frontier;
    }

    chunks
}

/// Splits one segment at one capacity, appending chunks and returning their
/// indices. `base` converts splitter-relative offsets to document offsets.
fn split_segment<S: ChunkSizer + Copy>(
    segment: &str,
    base: usize,
    size: usize,
    sizer: S,
    level: usize,
    parent: Option<usize>,
    out: &mut Vec<RawChunk>,
) -> Vec<usize> {
    let config = ChunkConfig::new(size).with_sizer(sizer).with_trim(false);
    let splitter = TextSplitter::new(config);

    let mut indices = Vec::new();
    for (ordinal, (offset, piece)) in splitter.chunk_indices(segment).enumerate() {
        let idx = out.len();
        out.push(RawChunk {
            level,
            ordinal,
            span: ByteSpan::new(base + offset, base + offset + piece.len()),
            parent,
            children: Vec::new(),
        });
        indices.push(idx);
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::sizer::CharSizer;

    fn sample_text() -> String {
        let mut text = String::new();
        for i in 0..12 {
            text.push_str(&format!(
                "Paragraph {i} opens with a claim. It continues with supporting \
                 detail that stretches the sentence out. It closes by restating \
                 the claim in different words.\n\n"
            ));
        }
        text
    }

    #[test]
    fn test_levels_follow_the_ladder() {
        let text = sample_text();
        let chunks = chunk_hierarchy(&text, &[800, 200, 80], CharSizer);
        assert!(!chunks.is_empty());
        let max_level = chunks.iter().map(|c| c.level).max().unwrap_or(0);
        assert_eq!(max_level, 2, "three sizes make three levels");
        for level in 0..=2 {
            assert!(
                chunks.iter().any(|c| c.level == level),
                "level {level} must be populated"
            );
        }
    }

    #[test]
    fn test_children_tile_their_parent_exactly() {
        let text = sample_text();
        let chunks = chunk_hierarchy(&text, &[800, 200], CharSizer);
        for (idx, parent) in chunks.iter().enumerate() {
            if parent.children.is_empty() {
                continue;
            }
            let mut cursor = parent.span.start;
            for &child_idx in &parent.children {
                let child = &chunks[child_idx];
                assert_eq!(
                    child.span.start, cursor,
                    "child of chunk {idx} must start where the previous ended"
                );
                assert_eq!(child.parent, Some(idx));
                cursor = child.span.end;
            }
            assert_eq!(cursor, parent.span.end, "children must cover chunk {idx}");
        }
    }

    #[test]
    fn test_leaf_concatenation_reproduces_the_document() {
        let text = sample_text();
        let sizes = [800, 200, 80];
        let chunks = chunk_hierarchy(&text, &sizes, CharSizer);
        let deepest = sizes.len() - 1;
        let rebuilt: String = chunks
            .iter()
            .filter(|c| c.level == deepest)
            .map(|c| &text[c.span.start..c.span.end])
            .collect();
        assert_eq!(rebuilt, text, "untrimmed leaves must tile the document");
    }

    #[test]
    fn test_short_document_yields_single_root_chain() {
        let text = "One short paragraph that fits everywhere.";
        let chunks = chunk_hierarchy(text, &[2048, 512], CharSizer);
        let roots: Vec<_> = chunks.iter().filter(|c| c.level == 0).collect();
        assert_eq!(roots.len(), 1, "short documents get one root");
        assert_eq!(
            roots[0].children.len(),
            1,
            "the root still splits into a (single) child at the next level"
        );
    }

    #[test]
    fn test_sibling_ordinals_are_sequential() {
        let text = sample_text();
        let chunks = chunk_hierarchy(&text, &[600, 150], CharSizer);
        for parent in chunks.iter().filter(|c| !c.children.is_empty()) {
            for (expected, &child_idx) in parent.children.iter().enumerate() {
                assert_eq!(chunks[child_idx].ordinal, expected);
            }
        }
    }

    #[test]
    fn test_whitespace_only_document_yields_nothing() {
        assert!(chunk_hierarchy("   \n\t  ", &[512, 128], CharSizer).is_empty());
        assert!(chunk_hierarchy("", &[512, 128], CharSizer).is_empty());
    }

    #[test]
    fn test_single_level_ladder_has_no_links() {
        let text = sample_text();
        let chunks = chunk_hierarchy(&text, &[200], CharSizer);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.parent.is_none() && c.children.is_empty()));
    }
}
