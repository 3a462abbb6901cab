//! Window resolution: widen retrieved sentences to their built windows.
//!
//! A retrieved sentence stands in for its neighborhood, so the resolver
//! swaps the bare sentence text for the window captured at build time.
//! Windows that overlap by sentence ordinal collapse into a single span,
//! keeping repeated text out of the context. Output spans follow document
//! order, not score order.

use crate::corpus::store::UnitStore;
use crate::corpus::types::{ByteSpan, ContextSpan, DocumentId, ScoredUnit};
use std::collections::BTreeMap;
use tracing::debug;

/// An inclusive ordinal range within one document's sentence sequence.
struct OrdinalRange {
    first: usize,
    last: usize,
    score: f32,
}

/// Substitutes window text for each retrieved sentence and merges
/// overlapping windows.
///
/// Adjacent but non-overlapping windows stay separate; only ranges that
/// share at least one sentence collapse. A merged span carries the max
/// score of its contributors. Non-sentence units in the input are ignored.
pub fn resolve_windows(store: &UnitStore, retrieved: &[ScoredUnit]) -> Vec<ContextSpan> {
    // Collect each hit's window as an ordinal range, grouped per document.
    let mut by_doc: BTreeMap<DocumentId, Vec<OrdinalRange>> = BTreeMap::new();
    for hit in retrieved {
        let Some(unit) = store.unit(hit.id) else {
            continue;
        };
        let Some(window) = unit.window.as_ref().filter(|w| !w.is_empty()) else {
            debug!(unit = %hit.id, "skipping windowless unit");
            continue;
        };
        let first = window.first().and_then(|&id| store.unit(id));
        let last = window.last().and_then(|&id| store.unit(id));
        if let (Some(first), Some(last)) = (first, last) {
            by_doc.entry(unit.doc).or_default().push(OrdinalRange {
                first: first.ordinal,
                last: last.ordinal,
                score: hit.score,
            });
        }
    }

    let mut spans = Vec::new();
    for (doc_id, mut ranges) in by_doc {
        let Some(doc) = store.document(doc_id) else {
            continue;
        };
        ranges.sort_by(|a, b| a.first.cmp(&b.first).then(a.last.cmp(&b.last)));

        // Fold overlapping ranges left to right.
        let mut merged: Vec<OrdinalRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(current) if range.first <= current.last => {
                    current.last = current.last.max(range.last);
                    current.score = current.score.max(range.score);
                }
                _ => merged.push(range),
            }
        }

        for range in merged {
            let units = doc.sentence_ids[range.first..=range.last].to_vec();
            let start = store.unit(units[0]).map(|u| u.span.start);
            let end = store.unit(units[units.len() - 1]).map(|u| u.span.end);
            let (Some(start), Some(end)) = (start, end) else {
                continue;
            };
            spans.push(ContextSpan {
                doc: doc_id,
                units,
                text: doc.text[start..end].to_string(),
                span: ByteSpan::new(start, end),
                score: range.score,
            });
        }
    }
    spans
}
