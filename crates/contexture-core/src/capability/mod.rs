//! External capability traits: embedding, generation, judging.
//!
//! The engines and the evaluator consume these as opaque collaborators. One
//! embedder instance serves an entire corpus build and every engine in a
//! comparison run, so similarity scores are commensurable; one generator and
//! one judge serve all engines so triad differences isolate retrieval
//! strategy.
//!
//! Failures are [`CapabilityError`]s, recoverable by contract: callers skip
//! the affected step or mark the affected metric absent and keep going.
//! Every call from the core is wrapped in [`call_with_timeout`], so a hung
//! service degrades into a per-call timeout instead of stalling a batch.

pub mod offline;

use crate::error::CapabilityError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Text → fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimension of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embeds a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CapabilityError>;

    /// Embeds a single text. Default delegates to [`Self::embed_batch`].
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            CapabilityError::Malformed {
                operation: "embed",
                detail: "batch of one returned no vector".to_string(),
            }
        })
    }
}

/// Token counts reported by a generation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt (query + contexts + instructions).
    pub prompt: u64,
    /// Tokens in the generated answer.
    pub completion: u64,
}

impl TokenUsage {
    /// Prompt plus completion tokens.
    pub fn total(&self) -> u64 {
        self.prompt + self.completion
    }
}

/// Output of one generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// The generated answer text.
    pub answer: String,
    /// Token accounting for the call.
    pub usage: TokenUsage,
    /// Monetary cost estimate for the call, in account currency.
    pub cost: f64,
}

/// (query, ordered context spans) → answer.
///
/// The generator is expected to answer only from the supplied context; that
/// contract lives in its prompt, outside this core. A generator that
/// ignores it shows up as degraded groundedness, nothing here detects it.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generates an answer from the query and its retrieved context spans.
    async fn generate(
        &self,
        query: &str,
        contexts: &[String],
    ) -> Result<Generation, CapabilityError>;
}

/// Which judgment a [`Judge`] call is asking for.
///
/// The pair semantics differ per task, matching the triad definitions:
/// judges typically prompt differently for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JudgeTask {
    /// (query, candidate context) → how relevant is the candidate to the
    /// query. Also used by the reranker.
    ContextRelevance,
    /// (query, answer) → how relevant is the answer to the query.
    AnswerRelevance,
    /// (evidence, claim) → how well the evidence supports the claim.
    Support,
}

/// One judgment: a score in [0, 1] and an optional rationale.
///
/// Only the score is consumed by the core; rationales pass through for
/// reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    /// Score clamped into [0, 1].
    pub score: f32,
    /// Free-form explanation, if the judge produced one.
    pub rationale: Option<String>,
}

impl Judgment {
    /// Creates a judgment, clamping the score into [0, 1].
    pub fn new(score: f32) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            rationale: None,
        }
    }

    /// Attaches a rationale.
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// (text, text) → graded judgment in [0, 1].
#[async_trait]
pub trait Judge: Send + Sync {
    /// Scores `(left, right)` under the given task. See [`JudgeTask`] for
    /// the pair semantics per task.
    async fn judge(
        &self,
        task: JudgeTask,
        left: &str,
        right: &str,
    ) -> Result<Judgment, CapabilityError>;
}

/// Runs a capability future under a deadline.
///
/// An elapsed deadline becomes [`CapabilityError::Timeout`] naming the
/// operation, which callers treat like any other per-call capability
/// failure.
pub async fn call_with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, CapabilityError>
where
    F: Future<Output = Result<T, CapabilityError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::Timeout { operation, limit }),
    }
}
