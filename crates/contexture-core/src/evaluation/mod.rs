//! Evaluation framework for comparing retrieval strategies.
//!
//! Quality is measured reference-free with the triad: context relevance,
//! groundedness, and answer relevance, each delegated to the [`Judge`]
//! capability and each a float in [0, 1]. No gold answers are consulted,
//! so any corpus and query list can be evaluated as-is.
//!
//! # Pieces
//!
//! - [`triad`]: per-query scoring ([`TriadEvaluator`], [`TriadScores`])
//! - [`leaderboard`]: append-only per-engine record log with summaries
//! - [`stats`]: bootstrap intervals, paired t-tests, and effect sizes for
//!   deciding whether a leaderboard gap is real
//!
//! # Absence semantics
//!
//! A metric that cannot be computed (judge failure, nothing retrieved,
//! empty answer) is recorded as absent, never as 0 or 1. Summaries
//! average over present values only and disclose absent counts, so a
//! degraded batch never silently skews a comparison.
//!
//! # Example
//!
//! ```ignore
//! use contexture_core::evaluation::{Leaderboard, TriadEvaluator};
//!
//! let evaluator = TriadEvaluator::new(judge, timeout);
//! let board = Leaderboard::new();
//!
//! let scores = evaluator.evaluate(&query, &context_texts, &answer).await;
//! board.record(engine.kind().label(), record_for(scores));
//!
//! for summary in board.summaries() {
//!     println!("{}: {:?}", summary.engine, summary.context_relevance.mean);
//! }
//! ```
//!
//! [`Judge`]: crate::capability::Judge

pub mod leaderboard;
pub mod stats;
pub mod triad;

pub use leaderboard::{EngineComparison, EngineSummary, EvalRecord, Leaderboard, MetricSummary};
pub use stats::{
    bootstrap_ci, cohens_d, effect_size_label, paired_ttest, BootstrapResult, TTestResult,
};
pub use triad::{decompose_statements, TriadEvaluator, TriadMetric, TriadScores};
