//! Append-only per-engine evaluation log with derived summaries.
//!
//! Records accumulate under an engine id as a batch runs; a summary can be
//! taken at any point and is valid for the records seen so far. Records
//! are never mutated or removed, so an interrupted batch leaves a usable
//! partial leaderboard.
//!
//! Absent metrics are excluded from their mean but disclosed as absent
//! counts, so a summary never silently averages over fewer records than
//! it claims.

use crate::capability::TokenUsage;
use crate::evaluation::stats::{cohens_d, paired_ttest};
use crate::evaluation::triad::{TriadMetric, TriadScores};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

/// One query's evaluation outcome under one engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRecord {
    pub query: String,
    pub scores: TriadScores,
    pub latency: Duration,
    pub usage: TokenUsage,
    pub cost: f64,
    /// False when the engine declined (insufficient context) or failed
    /// instead of answering.
    pub answered: bool,
}

impl EvalRecord {
    /// A record for a query the engine did not answer. All metrics are
    /// absent; latency still counts toward the engine's mean.
    pub fn unanswered(query: impl Into<String>, latency: Duration) -> Self {
        Self {
            query: query.into(),
            scores: TriadScores::default(),
            latency,
            usage: TokenUsage::default(),
            cost: 0.0,
            answered: false,
        }
    }
}

/// Mean of one metric over the records where it was present.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Mean over present values; `None` when no record had the metric.
    pub mean: Option<f32>,
    pub present: usize,
    pub absent: usize,
}

impl MetricSummary {
    fn over(records: &[EvalRecord], metric: TriadMetric) -> Self {
        let values: Vec<f32> = records
            .iter()
            .filter_map(|r| r.scores.metric(metric))
            .collect();
        let mean = if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f32>() / values.len() as f32)
        };
        Self {
            mean,
            present: values.len(),
            absent: records.len() - values.len(),
        }
    }
}

/// Aggregate view of one engine's records at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSummary {
    pub engine: String,
    /// Total records, answered or not.
    pub count: usize,
    pub answered: usize,
    pub context_relevance: MetricSummary,
    pub groundedness: MetricSummary,
    pub answer_relevance: MetricSummary,
    pub mean_latency: Duration,
    pub total_tokens: u64,
    pub total_cost: f64,
}

impl EngineSummary {
    fn over(engine: &str, records: &[EvalRecord]) -> Self {
        let count = records.len();
        let total_latency: Duration = records.iter().map(|r| r.latency).sum();
        Self {
            engine: engine.to_string(),
            count,
            answered: records.iter().filter(|r| r.answered).count(),
            context_relevance: MetricSummary::over(records, TriadMetric::ContextRelevance),
            groundedness: MetricSummary::over(records, TriadMetric::Groundedness),
            answer_relevance: MetricSummary::over(records, TriadMetric::AnswerRelevance),
            mean_latency: if count == 0 {
                Duration::ZERO
            } else {
                total_latency / count as u32
            },
            total_tokens: records.iter().map(|r| r.usage.total()).sum(),
            total_cost: records.iter().map(|r| r.cost).sum(),
        }
    }

    /// Reads one metric's summary by selector.
    pub fn metric(&self, metric: TriadMetric) -> MetricSummary {
        match metric {
            TriadMetric::ContextRelevance => self.context_relevance,
            TriadMetric::Groundedness => self.groundedness,
            TriadMetric::AnswerRelevance => self.answer_relevance,
        }
    }
}

/// Paired comparison of two engines on one metric.
///
/// Produced by [`Leaderboard::compare`]. Pairs are aligned by record index,
/// so the comparison is meaningful only for engines run over the same query
/// list in the same order.
#[derive(Debug, Clone, Serialize)]
pub struct EngineComparison {
    pub engine_a: String,
    pub engine_b: String,
    pub metric: TriadMetric,
    /// Pairs where both sides produced the metric.
    pub pairs: usize,
    /// Pairs dropped because at least one side's metric was absent.
    pub skipped: usize,
    pub mean_a: f64,
    pub mean_b: f64,
    /// Positive when engine A scores higher on average.
    pub t_statistic: f64,
    /// Two-tailed p-value of the paired t-test.
    pub p_value: f64,
    /// Cohen's d over the paired samples.
    pub effect_size: f64,
}

impl EngineComparison {
    /// True below the conventional 0.05 threshold.
    pub fn is_significant(&self) -> bool {
        self.p_value < 0.05
    }
}

/// Thread-safe append-only leaderboard keyed by engine id.
#[derive(Debug, Default)]
pub struct Leaderboard {
    inner: RwLock<HashMap<String, Vec<EvalRecord>>>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record under an engine id.
    pub fn record(&self, engine_id: &str, record: EvalRecord) {
        if let Ok(mut inner) = self.inner.write() {
            inner.entry(engine_id.to_string()).or_default().push(record);
            debug!(engine = engine_id, "record appended");
        }
    }

    /// Summary for one engine, or `None` if it has no records yet.
    pub fn summary(&self, engine_id: &str) -> Option<EngineSummary> {
        let inner = self.inner.read().ok()?;
        inner
            .get(engine_id)
            .map(|records| EngineSummary::over(engine_id, records))
    }

    /// Summaries for every engine, sorted by engine id.
    pub fn summaries(&self) -> Vec<EngineSummary> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        let mut engines: Vec<&String> = inner.keys().collect();
        engines.sort();
        engines
            .into_iter()
            .map(|engine| EngineSummary::over(engine, &inner[engine]))
            .collect()
    }

    /// One metric's values in record order, `None` where absent. Two
    /// engines run over the same query list in the same order yield
    /// index-aligned series suitable for paired comparison.
    pub fn metric_series(&self, engine_id: &str, metric: TriadMetric) -> Vec<Option<f64>> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        inner
            .get(engine_id)
            .map(|records| {
                records
                    .iter()
                    .map(|r| r.scores.metric(metric).map(f64::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Paired comparison of two engines on one metric.
    ///
    /// Records are paired by index; a pair where either side's metric is
    /// absent is skipped and counted, never imputed. Returns `None` when
    /// the engines were run over different-length query lists or fewer
    /// than two usable pairs remain.
    pub fn compare(
        &self,
        engine_a: &str,
        engine_b: &str,
        metric: TriadMetric,
    ) -> Option<EngineComparison> {
        let series_a = self.metric_series(engine_a, metric);
        let series_b = self.metric_series(engine_b, metric);
        if series_a.is_empty() || series_a.len() != series_b.len() {
            return None;
        }
        let mut first = Vec::new();
        let mut second = Vec::new();
        let mut skipped = 0usize;
        for pair in series_a.iter().zip(&series_b) {
            match pair {
                (Some(a), Some(b)) => {
                    first.push(*a);
                    second.push(*b);
                }
                _ => skipped += 1,
            }
        }
        if first.len() < 2 {
            return None;
        }
        let ttest = paired_ttest(&first, &second);
        let mean = |values: &[f64]| values.iter().sum::<f64>() / values.len() as f64;
        Some(EngineComparison {
            engine_a: engine_a.to_string(),
            engine_b: engine_b.to_string(),
            metric,
            pairs: first.len(),
            skipped,
            mean_a: mean(&first),
            mean_b: mean(&second),
            t_statistic: ttest.t_statistic,
            p_value: ttest.p_value,
            effect_size: cohens_d(&first, &second),
        })
    }

    /// Snapshot of one engine's records.
    pub fn records(&self, engine_id: &str) -> Vec<EvalRecord> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        inner.get(engine_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn answered(query: &str, cr: Option<f32>, ar: Option<f32>) -> EvalRecord {
        EvalRecord {
            query: query.to_string(),
            scores: TriadScores {
                context_relevance: cr,
                groundedness: Some(0.5),
                answer_relevance: ar,
            },
            latency: Duration::from_millis(20),
            usage: TokenUsage {
                prompt: 100,
                completion: 20,
            },
            cost: 0.001,
            answered: true,
        }
    }

    #[test]
    fn test_count_tracks_every_append() {
        let board = Leaderboard::new();
        for i in 0..5 {
            board.record("direct", answered(&format!("q{i}"), Some(0.8), Some(0.9)));
            let summary = board.summary("direct").unwrap();
            assert_eq!(summary.count, i + 1, "count grows with each append");
        }
    }

    #[test]
    fn test_absent_metrics_are_excluded_from_means_but_disclosed() {
        let board = Leaderboard::new();
        board.record("swr", answered("q0", Some(0.8), Some(0.5)));
        board.record("swr", answered("q1", None, Some(0.7)));

        let summary = board.summary("swr").unwrap();
        assert_eq!(summary.count, 2);

        let cr = summary.context_relevance;
        assert_eq!(cr.present, 1);
        assert_eq!(cr.absent, 1);
        assert!((cr.mean.unwrap() - 0.8).abs() < 1e-6, "absent is not zero");

        let ar = summary.answer_relevance;
        assert_eq!(ar.present, 2);
        assert!((ar.mean.unwrap() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_unanswered_records_count_with_absent_metrics() {
        let board = Leaderboard::new();
        board.record("amr", answered("q0", Some(0.9), Some(0.9)));
        board.record("amr", EvalRecord::unanswered("q1", Duration::from_millis(10)));

        let summary = board.summary("amr").unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.answered, 1);
        assert_eq!(summary.context_relevance.absent, 1);
    }

    #[test]
    fn test_totals_accumulate_across_records() {
        let board = Leaderboard::new();
        board.record("direct", answered("q0", Some(0.5), Some(0.5)));
        board.record("direct", answered("q1", Some(0.5), Some(0.5)));

        let summary = board.summary("direct").unwrap();
        assert_eq!(summary.total_tokens, 240);
        assert!((summary.total_cost - 0.002).abs() < 1e-9);
        assert_eq!(summary.mean_latency, Duration::from_millis(20));
    }

    #[test]
    fn test_unknown_engine_has_no_summary() {
        let board = Leaderboard::new();
        assert!(board.summary("nonexistent").is_none());
    }

    #[test]
    fn test_summaries_come_back_sorted_by_engine() {
        let board = Leaderboard::new();
        board.record("swr", answered("q", Some(0.5), Some(0.5)));
        board.record("amr", answered("q", Some(0.5), Some(0.5)));
        board.record("direct", answered("q", Some(0.5), Some(0.5)));

        let engines: Vec<String> =
            board.summaries().into_iter().map(|s| s.engine).collect();
        assert_eq!(engines, vec!["amr", "direct", "swr"]);
    }

    #[test]
    fn test_metric_series_preserves_record_order_and_absences() {
        let board = Leaderboard::new();
        board.record("direct", answered("q0", Some(0.2), Some(0.5)));
        board.record("direct", answered("q1", None, Some(0.5)));
        board.record("direct", answered("q2", Some(0.4), Some(0.5)));

        let series = board.metric_series("direct", TriadMetric::ContextRelevance);
        assert_eq!(series.len(), 3);
        assert!(series[0].is_some() && series[1].is_none() && series[2].is_some());
    }

    #[test]
    fn test_compare_pairs_by_index_and_skips_absent() {
        let board = Leaderboard::new();
        for cr in [Some(0.9), None, Some(0.8), Some(0.7)] {
            board.record("swr", answered("q", cr, Some(0.5)));
        }
        for cr in [Some(0.5), Some(0.6), None, Some(0.2)] {
            board.record("direct", answered("q", cr, Some(0.5)));
        }

        let cmp = board
            .compare("swr", "direct", TriadMetric::ContextRelevance)
            .expect("two usable pairs remain");
        assert_eq!(cmp.pairs, 2, "indices 0 and 3 are complete on both sides");
        assert_eq!(cmp.skipped, 2);
        assert!((cmp.mean_a - 0.8).abs() < 1e-6);
        assert!((cmp.mean_b - 0.35).abs() < 1e-6);
        assert!(cmp.t_statistic > 0.0, "first engine scores higher");
    }

    #[test]
    fn test_compare_engine_with_itself_finds_nothing() {
        let board = Leaderboard::new();
        for cr in [0.2, 0.5, 0.9] {
            board.record("direct", answered("q", Some(cr), Some(0.5)));
        }

        let cmp = board
            .compare("direct", "direct", TriadMetric::ContextRelevance)
            .unwrap();
        assert_eq!(cmp.t_statistic, 0.0);
        assert!((cmp.p_value - 1.0).abs() < 1e-9);
        assert_eq!(cmp.effect_size, 0.0);
        assert!(!cmp.is_significant());
    }

    #[test]
    fn test_compare_rejects_misaligned_runs() {
        let board = Leaderboard::new();
        board.record("swr", answered("q0", Some(0.5), Some(0.5)));
        board.record("swr", answered("q1", Some(0.5), Some(0.5)));
        board.record("direct", answered("q0", Some(0.5), Some(0.5)));

        assert!(
            board
                .compare("swr", "direct", TriadMetric::ContextRelevance)
                .is_none(),
            "different record counts cannot be paired"
        );
        assert!(board
            .compare("swr", "missing", TriadMetric::ContextRelevance)
            .is_none());
    }

    #[test]
    fn test_concurrent_recording_loses_nothing() {
        let board = Arc::new(Leaderboard::new());
        let mut handles = Vec::new();
        for worker in 0..4 {
            let board = Arc::clone(&board);
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    board.record(
                        "direct",
                        answered(&format!("w{worker}-q{i}"), Some(0.5), Some(0.5)),
                    );
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker panicked");
        }
        assert_eq!(board.summary("direct").unwrap().count, 100);
    }
}
