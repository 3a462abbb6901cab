//! Judge-backed reranking of candidate context spans.
//!
//! The similarity retriever ranks by embedding geometry; the reranker asks
//! the judge capability to score each candidate against the query and keeps
//! the best `top_n`. Identity and text of the candidates never change, only
//! scores, order, and count. If any judge call fails the whole step is
//! skipped and the input passes through unchanged.

use crate::capability::{call_with_timeout, Judge, JudgeTask};
use crate::corpus::types::ContextSpan;
use std::time::Duration;
use tracing::{debug, warn};

/// Rescores spans with the judge and keeps the top `top_n`.
///
/// Any judge failure (timeout, malformed response, transport) degrades to a
/// pass-through: the spans come back in their original similarity order,
/// untruncated, so a flaky judge never shrinks the context.
pub async fn rerank_spans(
    judge: &dyn Judge,
    query: &str,
    spans: Vec<ContextSpan>,
    top_n: usize,
    timeout: Duration,
) -> Vec<ContextSpan> {
    if spans.is_empty() {
        return spans;
    }

    let calls = spans.iter().map(|span| {
        call_with_timeout(
            "rerank",
            timeout,
            judge.judge(JudgeTask::ContextRelevance, query, &span.text),
        )
    });
    let judgments = futures::future::join_all(calls).await;

    let mut rescored = Vec::with_capacity(spans.len());
    for (span, judgment) in spans.iter().zip(judgments) {
        match judgment {
            Ok(judgment) => {
                let mut span = span.clone();
                span.score = judgment.score;
                rescored.push(span);
            }
            Err(error) => {
                warn!(%error, "rerank skipped, keeping similarity order");
                return spans;
            }
        }
    }

    // Stable sort keeps similarity order among equal judge scores.
    rescored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rescored.truncate(top_n);
    debug!(kept = rescored.len(), "rerank applied");
    rescored
}
