//! Exact top-k similarity retrieval over a unit pool.
//!
//! Retrieval is a pure scan: score every pooled unit against the query
//! embedding with cosine similarity, sort descending, keep `top_k`. Ties
//! break by pool position, which is corpus order, so rankings are stable
//! across runs. The pools are small enough that an exact scan beats
//! maintaining an approximate index.

use crate::corpus::types::{ScoredUnit, Unit};
use tracing::trace;

/// Cosine similarity between two vectors.
///
/// A zero-magnitude vector on either side yields 0.0 rather than NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|y| y * y).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Scores a pool against a query embedding and returns the best `top_k`.
///
/// The pool iterator must yield units in corpus order; that order is the
/// tie-break. Units without an embedding are skipped. Returns fewer than
/// `top_k` results only when the pool itself is smaller.
pub fn top_k_by_similarity<'a, I>(query: &[f32], pool: I, top_k: usize) -> Vec<ScoredUnit>
where
    I: IntoIterator<Item = &'a Unit>,
{
    let mut scored: Vec<(usize, ScoredUnit)> = pool
        .into_iter()
        .enumerate()
        .filter_map(|(position, unit)| {
            let embedding = unit.embedding.as_ref()?;
            let score = cosine_similarity(query, embedding);
            Some((position, ScoredUnit::new(unit.id, score)))
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.score
            .partial_cmp(&a.1.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(top_k);
    trace!(candidates = scored.len(), top_k, "similarity scan complete");
    scored.into_iter().map(|(_, unit)| unit).collect()
}
