//! Deterministic offline capabilities.
//!
//! Stand-ins for the real embedding/generation/judging services: pure
//! functions of their inputs, no assets, no network. They exist so the
//! pipeline can be exercised end to end: unit tests, integration tests,
//! and the harness's offline backend all run against these. Scores are
//! lexical proxies, useful for verifying plumbing and determinism, not
//! quality.

use crate::capability::{Embedder, Generation, Generator, Judge, JudgeTask, Judgment, TokenUsage};
use crate::chunking::split_sentences;
use crate::error::CapabilityError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

/// Lowercased alphanumeric tokens of a text.
fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// FNV-1a hash; stable across platforms and releases, unlike the std
/// hasher.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Whitespace-token estimate used for offline usage accounting.
fn estimate_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

// ============================================================================
// Embedder
// ============================================================================

/// Bag-of-words hash-projection embedder.
///
/// Each token lights up two hash buckets of the output vector; the vector
/// is then L2-normalized. Texts sharing vocabulary land close under cosine,
/// disjoint texts land near-orthogonal, and the mapping is a pure function
/// of the text. Two buckets per token keep accidental full collisions
/// between distinct vocabularies negligible.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Creates an embedder producing vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for token in tokens(text) {
            let h = fnv1a(token.as_bytes());
            v[(h % self.dimension as u64) as usize] += 1.0;
            v[((h >> 32) % self.dimension as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CapabilityError> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

// ============================================================================
// Generator
// ============================================================================

/// Answers by copying the context sentences that best overlap the query.
///
/// Takes up to `max_sentences` sentences ranked by query-token overlap and
/// returns them in their original order. The answer is verbatim context, so
/// groundedness against the same spans is high by construction, which makes
/// metric plumbing easy to assert.
#[derive(Debug, Clone)]
pub struct ExtractiveGenerator {
    /// Maximum number of context sentences copied into the answer.
    pub max_sentences: usize,
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self { max_sentences: 2 }
    }
}

/// Synthetic per-token price used for offline cost accounting.
const OFFLINE_COST_PER_TOKEN: f64 = 2e-6;

#[async_trait]
impl Generator for ExtractiveGenerator {
    async fn generate(
        &self,
        query: &str,
        contexts: &[String],
    ) -> Result<Generation, CapabilityError> {
        let query_tokens: HashSet<String> = tokens(query).into_iter().collect();

        // (overlap, position, sentence) over all context sentences.
        let mut candidates = Vec::new();
        for context in contexts {
            for sentence in split_sentences(context) {
                let overlap = tokens(&sentence.text)
                    .into_iter()
                    .filter(|t| query_tokens.contains(t))
                    .collect::<HashSet<_>>()
                    .len();
                candidates.push((overlap, candidates.len(), sentence.text));
            }
        }

        let mut ranked: Vec<usize> = (0..candidates.len()).collect();
        ranked.sort_by(|&a, &b| {
            candidates[b]
                .0
                .cmp(&candidates[a].0)
                .then(candidates[a].1.cmp(&candidates[b].1))
        });
        let mut selected: Vec<usize> = ranked.into_iter().take(self.max_sentences).collect();
        selected.sort_by_key(|&i| candidates[i].1);

        let answer = selected
            .iter()
            .map(|&i| candidates[i].2.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let prompt = estimate_tokens(query)
            + contexts.iter().map(|c| estimate_tokens(c)).sum::<u64>();
        let completion = estimate_tokens(&answer);
        let usage = TokenUsage { prompt, completion };
        Ok(Generation {
            answer,
            cost: usage.total() as f64 * OFFLINE_COST_PER_TOKEN,
            usage,
        })
    }
}

// ============================================================================
// Judge
// ============================================================================

/// Token-coverage judge.
///
/// Scores how much of a subject text's vocabulary appears in an evidence
/// text. Which side is the subject depends on the task: for relevance tasks
/// the query is the subject (how much of the question does this text touch),
/// for support the claim is the subject (how much of the claim does the
/// evidence cover).
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalJudge;

fn coverage(subject: &[String], evidence: &HashSet<String>) -> (usize, usize) {
    let distinct: HashSet<&String> = subject.iter().collect();
    let hits = distinct.iter().filter(|t| evidence.contains(**t)).count();
    (hits, distinct.len())
}

#[async_trait]
impl Judge for LexicalJudge {
    async fn judge(
        &self,
        task: JudgeTask,
        left: &str,
        right: &str,
    ) -> Result<Judgment, CapabilityError> {
        let (subject, evidence) = match task {
            // left = query, right = candidate/answer
            JudgeTask::ContextRelevance | JudgeTask::AnswerRelevance => (left, right),
            // left = evidence, right = claim
            JudgeTask::Support => (right, left),
        };
        let subject_tokens = tokens(subject);
        let evidence_tokens: HashSet<String> = tokens(evidence).into_iter().collect();
        let (hits, total) = coverage(&subject_tokens, &evidence_tokens);
        let score = if total == 0 {
            0.0
        } else {
            hits as f32 / total as f32
        };
        Ok(Judgment::new(score).with_rationale(format!("matched {hits} of {total} terms")))
    }
}

// ============================================================================
// Failure injection
// ============================================================================

/// How an injected judge failure presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// The call reports a per-call timeout.
    Timeout,
    /// The call reports an unparsable response.
    Malformed,
}

/// Judge wrapper that fails for selected tasks and delegates the rest.
///
/// Used to verify the degradation contract: an absent metric must stay
/// absent (never defaulted) while the other metrics keep flowing.
pub struct FailingJudge<J> {
    inner: J,
    fail_on: Vec<JudgeTask>,
    mode: FailureMode,
}

impl<J> FailingJudge<J> {
    /// Wraps `inner`, failing every call whose task is in `fail_on`.
    pub fn new(inner: J, fail_on: &[JudgeTask], mode: FailureMode) -> Self {
        Self {
            inner,
            fail_on: fail_on.to_vec(),
            mode,
        }
    }
}

#[async_trait]
impl<J: Judge> Judge for FailingJudge<J> {
    async fn judge(
        &self,
        task: JudgeTask,
        left: &str,
        right: &str,
    ) -> Result<Judgment, CapabilityError> {
        if self.fail_on.contains(&task) {
            return Err(match self.mode {
                FailureMode::Timeout => CapabilityError::Timeout {
                    operation: "judge",
                    limit: Duration::from_millis(50),
                },
                FailureMode::Malformed => CapabilityError::Malformed {
                    operation: "judge",
                    detail: "response did not contain a score".to_string(),
                },
            });
        }
        self.inner.judge(task, left, right).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("the quick brown fox").await.unwrap();
        let b = embedder.embed("the quick brown fox").await.unwrap();
        assert_eq!(a, b, "same text must embed identically");
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "vectors are unit length, got {norm}");
    }

    #[tokio::test]
    async fn test_shared_vocabulary_beats_disjoint_vocabulary() {
        let embedder = HashEmbedder::default();
        let base = embedder.embed("solar panels convert sunlight").await.unwrap();
        let near = embedder.embed("solar panels on the roof").await.unwrap();
        let far = embedder.embed("quarterly revenue dipped slightly").await.unwrap();
        let dot = |x: &[f32], y: &[f32]| -> f32 { x.iter().zip(y).map(|(a, b)| a * b).sum() };
        assert!(
            dot(&base, &near) > dot(&base, &far),
            "overlapping text must score higher"
        );
    }

    #[tokio::test]
    async fn test_empty_text_embeds_to_zero_vector() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed("").await.unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_extractive_generator_copies_the_overlapping_sentence() {
        let generator = ExtractiveGenerator::default();
        let contexts = vec![
            "The sky is blue on clear days. Grass is green in spring.".to_string(),
        ];
        let output = generator
            .generate("What color is the sky?", &contexts)
            .await
            .unwrap();
        assert!(
            output.answer.contains("sky is blue"),
            "answer should quote the matching sentence: {}",
            output.answer
        );
        assert!(output.usage.prompt > 0 && output.usage.completion > 0);
        assert!(output.cost > 0.0);
    }

    #[tokio::test]
    async fn test_generator_handles_empty_context() {
        let generator = ExtractiveGenerator::default();
        let output = generator.generate("anything?", &[]).await.unwrap();
        assert!(output.answer.is_empty());
        assert_eq!(output.usage.completion, 0);
    }

    #[tokio::test]
    async fn test_lexical_judge_scores_containment_high() {
        let judge = LexicalJudge;
        let full = judge
            .judge(
                JudgeTask::ContextRelevance,
                "solar panels",
                "solar panels convert sunlight into power",
            )
            .await
            .unwrap();
        assert!((full.score - 1.0).abs() < f32::EPSILON, "got {}", full.score);

        let none = judge
            .judge(JudgeTask::ContextRelevance, "solar panels", "unrelated words entirely")
            .await
            .unwrap();
        assert_eq!(none.score, 0.0);
    }

    #[tokio::test]
    async fn test_support_task_measures_claim_coverage() {
        let judge = LexicalJudge;
        let evidence = "The reactor shut down at noon after a coolant warning.";
        let grounded = judge
            .judge(JudgeTask::Support, evidence, "the reactor shut down")
            .await
            .unwrap();
        let ungrounded = judge
            .judge(JudgeTask::Support, evidence, "the turbine caught fire")
            .await
            .unwrap();
        assert!(
            grounded.score > ungrounded.score,
            "claims drawn from the evidence must score higher"
        );
    }

    #[tokio::test]
    async fn test_judge_reports_a_rationale() {
        let judgment = LexicalJudge
            .judge(JudgeTask::AnswerRelevance, "a b", "a b")
            .await
            .unwrap();
        assert!(judgment.rationale.is_some());
    }

    #[tokio::test]
    async fn test_failing_judge_fails_only_selected_tasks() {
        let judge = FailingJudge::new(
            LexicalJudge,
            &[JudgeTask::ContextRelevance],
            FailureMode::Timeout,
        );
        let err = judge
            .judge(JudgeTask::ContextRelevance, "q", "c")
            .await
            .expect_err("selected task must fail");
        assert!(matches!(err, CapabilityError::Timeout { .. }));

        judge
            .judge(JudgeTask::AnswerRelevance, "q", "a")
            .await
            .expect("unselected task must pass through");
    }
}
