//! Corpus and query-set loading, plus synthetic query generation.
//!
//! A corpus is a directory of `.txt` files, one document per file, read in
//! lexical filename order so the corpus fingerprint is stable across
//! platforms. A query set is a plain text file, one query per line. When no
//! query file is given, the harness synthesizes keyword queries from the
//! corpus itself, so a smoke run needs nothing beyond the documents.

use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Top distinctive terms kept per document when synthesizing queries.
const TERMS_PER_DOCUMENT: usize = 8;

// =============================================================================
// Loading
// =============================================================================

/// Reads every `.txt` file under `dir` as one document keyed by file stem.
///
/// Files are sorted by path so the corpus order (and with it the store
/// fingerprint) does not depend on directory iteration order.
pub fn load_corpus(dir: &Path) -> Result<Vec<(String, String)>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("reading corpus directory {}", dir.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("txt") {
            paths.push(path);
        }
    }
    paths.sort();
    if paths.is_empty() {
        bail!("no .txt files found in {}", dir.display());
    }

    let mut corpus = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let source_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        corpus.push((source_id, text));
    }
    Ok(corpus)
}

/// Reads one query per line, skipping blank lines and `#` comments.
pub fn load_queries(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading query file {}", path.display()))?;
    let queries: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    if queries.is_empty() {
        bail!("query file {} contains no queries", path.display());
    }
    Ok(queries)
}

// =============================================================================
// Synthetic queries
// =============================================================================

/// Synthesizes `count` keyword queries from the corpus.
///
/// Terms are ranked per document by TF-IDF; a seeded generator then picks a
/// document and two of its top terms per query. The same corpus, seed, and
/// count always yield the same queries.
pub fn synthesize_queries(corpus: &[(String, String)], count: usize, seed: u64) -> Vec<String> {
    let ranked = ranked_terms(corpus);
    let pools: Vec<&Vec<String>> = ranked.iter().filter(|terms| !terms.is_empty()).collect();
    if pools.is_empty() {
        return Vec::new();
    }

    let mut rng = QueryRng::new(seed);
    let mut queries = Vec::with_capacity(count);
    for _ in 0..count {
        let pool = pools[rng.index(pools.len())];
        let first = rng.index(pool.len());
        let mut terms = vec![pool[first].as_str()];
        if pool.len() > 1 {
            let offset = 1 + rng.index(pool.len() - 1);
            terms.push(pool[(first + offset) % pool.len()].as_str());
        }
        queries.push(terms.join(" "));
    }
    queries
}

/// Per-document top terms ranked by TF-IDF against the rest of the corpus.
fn ranked_terms(corpus: &[(String, String)]) -> Vec<Vec<String>> {
    let docs: Vec<Vec<String>> = corpus.iter().map(|(_, text)| terms(text)).collect();

    let mut df: HashMap<&str, usize> = HashMap::new();
    for doc in &docs {
        let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
        for term in unique {
            *df.entry(term).or_insert(0) += 1;
        }
    }

    let n = docs.len() as f64;
    docs.iter()
        .map(|doc| {
            // BTreeMap keeps tie order alphabetical, so ranking is
            // deterministic independent of hash state.
            let mut tf: BTreeMap<&str, usize> = BTreeMap::new();
            for term in doc {
                *tf.entry(term).or_insert(0) += 1;
            }
            let mut scored: Vec<(&str, f64)> = tf
                .iter()
                .map(|(&term, &count)| (term, count as f64 * (n / df[term] as f64).ln()))
                .filter(|(_, score)| *score > 0.0)
                .collect();
            // A single-document corpus has zero IDF everywhere; rank by
            // raw frequency instead of returning nothing.
            if scored.is_empty() {
                scored = tf.iter().map(|(&term, &count)| (term, count as f64)).collect();
            }
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(TERMS_PER_DOCUMENT);
            scored.into_iter().map(|(term, _)| term.to_string()).collect()
        })
        .collect()
}

/// Lowercased alphanumeric terms of three or more characters.
fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Linear congruential generator, Numerical Recipes parameters, so query
/// synthesis stays reproducible without a randomness dependency.
struct QueryRng {
    state: u64,
}

impl QueryRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn index(&mut self, len: usize) -> usize {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.state as usize) % len
    }
}
