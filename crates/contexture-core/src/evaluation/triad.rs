//! Reference-free triad evaluation of a single query run.
//!
//! Three scores, each in [0, 1], each computed without a gold answer:
//!
//! - **Context relevance**: how well each retrieved span fits the query,
//!   averaged across spans.
//! - **Groundedness**: how well the answer's statements are supported by
//!   the concatenated context.
//! - **Answer relevance**: how well the answer addresses the query.
//!
//! Every score delegates the actual judgment to the [`Judge`] capability.
//! A failed or timed-out judge call makes that one metric absent for the
//! record; it is never defaulted to 0 or 1 and never aborts the run.

use crate::capability::{call_with_timeout, Judge, JudgeTask};
use crate::chunking::split_sentences;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Selector for one of the three triad metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriadMetric {
    ContextRelevance,
    Groundedness,
    AnswerRelevance,
}

impl TriadMetric {
    /// Every metric, in reporting order.
    pub const ALL: [TriadMetric; 3] = [
        TriadMetric::ContextRelevance,
        TriadMetric::Groundedness,
        TriadMetric::AnswerRelevance,
    ];

    /// Stable identifier used in reports.
    pub fn label(self) -> &'static str {
        match self {
            TriadMetric::ContextRelevance => "context_relevance",
            TriadMetric::Groundedness => "groundedness",
            TriadMetric::AnswerRelevance => "answer_relevance",
        }
    }
}

/// The three scores for one query run. `None` means the metric could not
/// be computed, which is distinct from scoring zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TriadScores {
    pub context_relevance: Option<f32>,
    pub groundedness: Option<f32>,
    pub answer_relevance: Option<f32>,
}

impl TriadScores {
    /// Reads one metric by selector.
    pub fn metric(&self, metric: TriadMetric) -> Option<f32> {
        match metric {
            TriadMetric::ContextRelevance => self.context_relevance,
            TriadMetric::Groundedness => self.groundedness,
            TriadMetric::AnswerRelevance => self.answer_relevance,
        }
    }

    /// True when every metric is present.
    pub fn is_complete(&self) -> bool {
        TriadMetric::ALL.iter().all(|&m| self.metric(m).is_some())
    }
}

/// Splits an answer into the atomic statements scored for groundedness.
///
/// Statements are the answer's sentences; an unterminated trailing clause
/// counts as a statement of its own.
pub fn decompose_statements(answer: &str) -> Vec<String> {
    split_sentences(answer)
        .into_iter()
        .map(|sentence| sentence.text)
        .collect()
}

/// Computes triad scores by delegating judgments to a [`Judge`].
pub struct TriadEvaluator {
    judge: Arc<dyn Judge>,
    timeout: Duration,
}

impl TriadEvaluator {
    pub fn new(judge: Arc<dyn Judge>, timeout: Duration) -> Self {
        Self { judge, timeout }
    }

    /// Scores one query run. The three metrics are computed concurrently
    /// and independently; one failing never hides the others.
    #[instrument(skip_all, fields(contexts = contexts.len()))]
    pub async fn evaluate(
        &self,
        query: &str,
        contexts: &[String],
        answer: &str,
    ) -> TriadScores {
        let (context_relevance, groundedness, answer_relevance) = tokio::join!(
            self.context_relevance(query, contexts),
            self.groundedness(contexts, answer),
            self.answer_relevance(query, answer),
        );
        let scores = TriadScores {
            context_relevance,
            groundedness,
            answer_relevance,
        };
        debug!(?scores, "triad evaluated");
        scores
    }

    /// Mean judge score of (query, context) over all retrieved contexts.
    /// Absent when nothing was retrieved.
    async fn context_relevance(&self, query: &str, contexts: &[String]) -> Option<f32> {
        if contexts.is_empty() {
            return None;
        }
        let calls = contexts.iter().map(|context| {
            call_with_timeout(
                "judge_context_relevance",
                self.timeout,
                self.judge.judge(JudgeTask::ContextRelevance, query, context),
            )
        });
        let mut sum = 0.0;
        for result in futures::future::join_all(calls).await {
            match result {
                Ok(judgment) => sum += judgment.score,
                Err(error) => {
                    warn!(%error, "context relevance unavailable for this record");
                    return None;
                }
            }
        }
        Some(sum / contexts.len() as f32)
    }

    /// Mean per-statement support of the answer against the concatenated
    /// contexts. A statement with no support contributes 0 to the mean.
    async fn groundedness(&self, contexts: &[String], answer: &str) -> Option<f32> {
        let statements = decompose_statements(answer);
        if statements.is_empty() {
            return None;
        }
        let evidence = contexts.join("\n");
        let calls = statements.iter().map(|statement| {
            call_with_timeout(
                "judge_support",
                self.timeout,
                self.judge.judge(JudgeTask::Support, &evidence, statement),
            )
        });
        let mut sum = 0.0;
        for result in futures::future::join_all(calls).await {
            match result {
                Ok(judgment) => sum += judgment.score,
                Err(error) => {
                    warn!(%error, "groundedness unavailable for this record");
                    return None;
                }
            }
        }
        Some(sum / statements.len() as f32)
    }

    /// Single judge score of (query, answer). Absent for empty answers.
    async fn answer_relevance(&self, query: &str, answer: &str) -> Option<f32> {
        if answer.trim().is_empty() {
            return None;
        }
        let result = call_with_timeout(
            "judge_answer_relevance",
            self.timeout,
            self.judge.judge(JudgeTask::AnswerRelevance, query, answer),
        )
        .await;
        match result {
            Ok(judgment) => Some(judgment.score),
            Err(error) => {
                warn!(%error, "answer relevance unavailable for this record");
                None
            }
        }
    }
}
