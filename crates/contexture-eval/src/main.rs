//! Contexture Evaluation Harness
//!
//! Runs the retrieval engines side by side over one corpus and query set,
//! scores every answer with the reference-free triad, and reports
//! per-engine summaries with paired statistical comparisons.
//!
//! # Usage
//!
//! ```bash
//! # Compare all engines over a corpus, queries synthesized from the text
//! cargo run -p contexture-eval --release -- ./corpus
//!
//! # Real queries, snapshot cache, JSON report
//! cargo run -p contexture-eval --release -- ./corpus \
//!     --queries queries.txt --cache-dir .contexture --json report.json
//!
//! # A subset of engines against an OpenAI-compatible endpoint
//! cargo run -p contexture-eval --release -- ./corpus \
//!     --engines sentence_window,auto_merging \
//!     --backend openai --base-url http://localhost:8080/v1
//! ```

mod backend;
mod queries;

use anyhow::{bail, Context, Result};
use backend::{BackendKind, Capabilities, OpenAiBackend, OpenAiConfig};
use clap::{Parser, ValueEnum};
use contexture_core::config::{BuildParams, ChunkingParams, RetrievalParams, SizeMeasure, WindowParams};
use contexture_core::corpus::{CorpusBuilder, UnitStore};
use contexture_core::evaluation::{
    bootstrap_ci, effect_size_label, EngineComparison, EngineSummary, EvalRecord, Leaderboard,
    TriadEvaluator, TriadMetric,
};
use contexture_core::retrieval::{ContextEngine, EngineConfig, EngineKind, QueryOutcome};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Resamples drawn per bootstrap confidence interval.
const BOOTSTRAP_RESAMPLES: usize = 1000;

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "contexture-eval",
    version,
    about = "Compare retrieval engines on one corpus with triad evaluation"
)]
struct Args {
    /// Directory of .txt corpus documents, one document per file
    corpus: PathBuf,

    /// Query file, one query per line (default: synthesize from the corpus)
    #[arg(long)]
    queries: Option<PathBuf>,

    /// Number of queries to synthesize when no query file is given
    #[arg(long, default_value_t = 12)]
    num_queries: usize,

    /// Seed for query synthesis and bootstrap resampling
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Engines to run, comma separated (default: all)
    #[arg(long, value_delimiter = ',')]
    engines: Option<Vec<String>>,

    /// Capability backend
    #[arg(long, value_enum, default_value = "offline")]
    backend: BackendKind,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, default_value = "https://api.openai.com/v1")]
    base_url: String,

    /// API key for the openai backend (default: OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Embedding model for the openai backend
    #[arg(long, default_value = "text-embedding-3-small")]
    embed_model: String,

    /// Chat model for the openai backend, used for generation and judging
    #[arg(long, default_value = "gpt-4o-mini")]
    chat_model: String,

    /// Embedding dimension (default: embedder's own for offline, 1536 for openai)
    #[arg(long)]
    embedding_dimension: Option<usize>,

    /// Directory for unit-store snapshots keyed by corpus fingerprint
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Chunk-size ladder, comma separated, largest first
    #[arg(long, value_delimiter = ',')]
    chunk_sizes: Option<Vec<usize>>,

    /// How chunk sizes are measured
    #[arg(long, value_enum, default_value = "tokens")]
    measure: MeasureArg,

    /// Sentence-window radius
    #[arg(long)]
    window_radius: Option<usize>,

    /// Candidates fetched by similarity retrieval
    #[arg(long)]
    top_k: Option<usize>,

    /// Candidates kept after reranking
    #[arg(long)]
    top_n: Option<usize>,

    /// Auto-merge coverage threshold in (0, 1]
    #[arg(long)]
    merge_threshold: Option<f32>,

    /// Decline to answer when no span reaches this relevance
    #[arg(long)]
    min_relevance: Option<f32>,

    /// Per-capability-call timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Write the full report as JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MeasureArg {
    Chars,
    Tokens,
}

impl From<MeasureArg> for SizeMeasure {
    fn from(arg: MeasureArg) -> Self {
        match arg {
            MeasureArg::Chars => SizeMeasure::Chars,
            MeasureArg::Tokens => SizeMeasure::Tokens,
        }
    }
}

fn build_params(args: &Args) -> BuildParams {
    let defaults = BuildParams::default();
    BuildParams {
        chunking: ChunkingParams {
            sizes: args.chunk_sizes.clone().unwrap_or(defaults.chunking.sizes),
            measure: args.measure.into(),
        },
        window: WindowParams {
            radius: args.window_radius.unwrap_or(defaults.window.radius),
        },
    }
}

fn retrieval_params(args: &Args) -> RetrievalParams {
    let defaults = RetrievalParams::default();
    RetrievalParams {
        top_k: args.top_k.unwrap_or(defaults.top_k),
        top_n: args.top_n.unwrap_or(defaults.top_n),
        merge_threshold: args.merge_threshold.unwrap_or(defaults.merge_threshold),
        min_relevance: args.min_relevance,
    }
}

/// Maps `--engines` labels onto kinds, deduplicated, defaulting to all.
fn parse_engines(labels: Option<&Vec<String>>) -> Result<Vec<EngineKind>> {
    let Some(labels) = labels else {
        return Ok(EngineKind::ALL.to_vec());
    };
    let mut kinds = Vec::new();
    for label in labels {
        let kind = EngineKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.label() == label.trim())
            .with_context(|| {
                format!(
                    "unknown engine {label:?}; valid engines: {}",
                    EngineKind::ALL.map(EngineKind::label).join(", ")
                )
            })?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

fn capabilities(args: &Args) -> Result<Capabilities> {
    match args.backend {
        BackendKind::Offline => Ok(Capabilities::offline(args.embedding_dimension)),
        BackendKind::Openai => {
            let api_key = args
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .context("the openai backend needs --api-key or OPENAI_API_KEY")?;
            let config = OpenAiConfig {
                base_url: args.base_url.clone(),
                api_key,
                embed_model: args.embed_model.clone(),
                chat_model: args.chat_model.clone(),
                dimension: args
                    .embedding_dimension
                    .unwrap_or(backend::DEFAULT_REMOTE_DIMENSION),
            };
            Ok(Capabilities::openai(OpenAiBackend::new(config)?))
        }
    }
}

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Serialize)]
struct EvalReport {
    corpus: CorpusInfo,
    engines: Vec<EngineSummary>,
    comparisons: Vec<EngineComparison>,
    records: BTreeMap<String, Vec<EvalRecord>>,
}

#[derive(Debug, Serialize)]
struct CorpusInfo {
    documents: usize,
    units: usize,
    queries: usize,
    fingerprint: String,
}

// =============================================================================
// Evaluation
// =============================================================================

/// Runs one engine over the whole query set, recording every outcome.
async fn evaluate_engine(
    engine: &ContextEngine,
    queries: &[String],
    evaluator: &TriadEvaluator,
    board: &Leaderboard,
) {
    let bar = ProgressBar::new(queries.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40}] {pos}/{len}")
            .unwrap(),
    );
    bar.set_message(engine.kind().label());

    for query in queries {
        let record = run_query(engine, query, evaluator).await;
        board.record(engine.kind().label(), record);
        bar.inc(1);
    }
    bar.finish();
}

/// One query against one engine. Declines and failures both become
/// unanswered rows; a failure never aborts the batch.
async fn run_query(
    engine: &ContextEngine,
    query: &str,
    evaluator: &TriadEvaluator,
) -> EvalRecord {
    let started = Instant::now();
    match engine.query(query).await {
        Ok(QueryOutcome::Answered(answer)) => {
            let contexts: Vec<String> =
                answer.spans.iter().map(|span| span.text.clone()).collect();
            let scores = evaluator.evaluate(query, &contexts, &answer.answer).await;
            EvalRecord {
                query: query.to_string(),
                scores,
                latency: answer.latency,
                usage: answer.usage,
                cost: answer.cost,
                answered: true,
            }
        }
        Ok(QueryOutcome::InsufficientContext {
            best_relevance,
            latency,
        }) => {
            debug!(query, ?best_relevance, "engine declined to answer");
            EvalRecord::unanswered(query, latency)
        }
        Err(error) => {
            warn!(query, %error, "query failed");
            EvalRecord::unanswered(query, started.elapsed())
        }
    }
}

/// Paired comparisons for every engine pair and metric with usable data.
fn compare_engines(board: &Leaderboard, kinds: &[EngineKind]) -> Vec<EngineComparison> {
    let mut comparisons = Vec::new();
    for (i, a) in kinds.iter().enumerate() {
        for b in &kinds[i + 1..] {
            for metric in TriadMetric::ALL {
                if let Some(cmp) = board.compare(a.label(), b.label(), metric) {
                    comparisons.push(cmp);
                }
            }
        }
    }
    comparisons
}

// =============================================================================
// Output
// =============================================================================

fn mean_cell(mean: Option<f32>) -> String {
    mean.map(|m| format!("{m:.3}")).unwrap_or_else(|| "-".to_string())
}

fn print_report(report: &EvalReport, seed: u64) {
    println!("\n{}", "=".repeat(80));
    println!("CONTEXTURE ENGINE COMPARISON");
    println!("{}", "=".repeat(80));
    println!(
        "\nCorpus: {} documents, {} units (fingerprint {})",
        report.corpus.documents,
        report.corpus.units,
        &report.corpus.fingerprint[..16.min(report.corpus.fingerprint.len())]
    );
    println!("Queries: {}", report.corpus.queries);

    println!("\n{}", "-".repeat(70));
    println!(
        "{:<16} {:>5} {:>9} {:>8} {:>8} {:>8} {:>9} {:>8}",
        "Engine", "N", "Answered", "CtxRel", "Ground", "AnsRel", "Latency", "Tokens"
    );
    for summary in &report.engines {
        println!(
            "{:<16} {:>5} {:>9} {:>8} {:>8} {:>8} {:>7.0}ms {:>8}",
            summary.engine,
            summary.count,
            summary.answered,
            mean_cell(summary.context_relevance.mean),
            mean_cell(summary.groundedness.mean),
            mean_cell(summary.answer_relevance.mean),
            summary.mean_latency.as_secs_f64() * 1000.0,
            summary.total_tokens,
        );
    }

    // Absences and declines never hide inside a mean; spell them out.
    let mut disclosed = false;
    for summary in &report.engines {
        let declined = summary.count - summary.answered;
        let mut notes: Vec<String> = Vec::new();
        if declined > 0 {
            notes.push(format!("{declined} insufficient-context"));
        }
        for metric in TriadMetric::ALL {
            let absent = summary.metric(metric).absent;
            if absent > 0 {
                notes.push(format!("{} absent {absent}", metric.label()));
            }
        }
        if !notes.is_empty() {
            if !disclosed {
                println!();
                disclosed = true;
            }
            println!("  {}: {}", summary.engine, notes.join(", "));
        }
    }

    println!("\n{}", "-".repeat(70));
    println!("BOOTSTRAP 95% CI (seed {seed})");
    for summary in &report.engines {
        for metric in TriadMetric::ALL {
            let values: Vec<f64> = report.records[&summary.engine]
                .iter()
                .filter_map(|r| r.scores.metric(metric).map(f64::from))
                .collect();
            if values.len() >= 2 {
                let ci = bootstrap_ci(&values, BOOTSTRAP_RESAMPLES, seed);
                println!(
                    "  {:<16} {:<18} {}",
                    summary.engine,
                    metric.label(),
                    ci.display(3)
                );
            }
        }
    }

    if !report.comparisons.is_empty() {
        println!("\n{}", "-".repeat(70));
        println!("PAIRED COMPARISONS (* = p < 0.05)");
        for cmp in &report.comparisons {
            let sig = if cmp.is_significant() { "*" } else { "" };
            let skipped = if cmp.skipped > 0 {
                format!(", {} skipped", cmp.skipped)
            } else {
                String::new()
            };
            println!(
                "{} vs {} ({}): {:.3} vs {:.3}, p={:.4}{} d={:.3} ({}), {} pairs{}",
                cmp.engine_a,
                cmp.engine_b,
                cmp.metric.label(),
                cmp.mean_a,
                cmp.mean_b,
                cmp.p_value,
                sig,
                cmp.effect_size,
                effect_size_label(cmp.effect_size),
                cmp.pairs,
                skipped,
            );
        }
    }

    println!("{}\n", "=".repeat(80));
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let capabilities = capabilities(&args)?;
    let corpus = queries::load_corpus(&args.corpus)?;
    let query_set = match &args.queries {
        Some(path) => queries::load_queries(path)?,
        None => {
            let synthesized = queries::synthesize_queries(&corpus, args.num_queries, args.seed);
            if synthesized.is_empty() {
                bail!("could not synthesize queries from the corpus");
            }
            eprintln!("Synthesized {} queries from the corpus", synthesized.len());
            synthesized
        }
    };
    let kinds = parse_engines(args.engines.as_ref())?;

    eprintln!("Building unit store ({} documents)...", corpus.len());
    let builder = CorpusBuilder::new(build_params(&args), Arc::clone(&capabilities.embedder))?;
    let store: UnitStore = match &args.cache_dir {
        Some(dir) => builder.load_or_build(&corpus, dir).await?,
        None => builder.build(&corpus).await?,
    };
    let store = Arc::new(store);

    let timeout = Duration::from_secs(args.timeout_secs);
    let engine_config = EngineConfig::new(
        Arc::clone(&capabilities.embedder),
        Arc::clone(&capabilities.generator),
        Arc::clone(&capabilities.judge),
    )
    .with_retrieval(retrieval_params(&args))
    .with_timeout(timeout);

    let engines: Vec<ContextEngine> = kinds
        .iter()
        .map(|&kind| ContextEngine::new(kind, Arc::clone(&store), engine_config.clone()))
        .collect::<Result<_, _>>()?;

    let evaluator = TriadEvaluator::new(Arc::clone(&capabilities.judge), timeout);
    let board = Leaderboard::new();

    for engine in &engines {
        evaluate_engine(engine, &query_set, &evaluator, &board).await;
    }

    let report = EvalReport {
        corpus: CorpusInfo {
            documents: store.document_count(),
            units: store.unit_count(),
            queries: query_set.len(),
            fingerprint: store.fingerprint().to_string(),
        },
        engines: board.summaries(),
        comparisons: compare_engines(&board, &kinds),
        records: kinds
            .iter()
            .map(|kind| (kind.label().to_string(), board.records(kind.label())))
            .collect(),
    };

    print_report(&report, args.seed);

    if let Some(path) = &args.json {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing report to {}", path.display()))?;
        eprintln!("Report written to {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_labels_parse_to_kinds() {
        let labels = vec!["auto_merging".to_string(), "direct".to_string()];
        let kinds = parse_engines(Some(&labels)).unwrap();
        assert_eq!(kinds, vec![EngineKind::AutoMerging, EngineKind::Direct]);
    }

    #[test]
    fn test_missing_engine_list_means_all_engines() {
        let kinds = parse_engines(None).unwrap();
        assert_eq!(kinds, EngineKind::ALL.to_vec());
    }

    #[test]
    fn test_unknown_engine_label_is_rejected() {
        let labels = vec!["keyword".to_string()];
        let err = parse_engines(Some(&labels)).unwrap_err();
        assert!(err.to_string().contains("keyword"));
    }

    #[test]
    fn test_duplicate_engine_labels_collapse() {
        let labels = vec!["direct".to_string(), "direct".to_string()];
        let kinds = parse_engines(Some(&labels)).unwrap();
        assert_eq!(kinds, vec![EngineKind::Direct]);
    }

    #[test]
    fn test_parameter_overrides_reach_the_params() {
        let args = Args::parse_from([
            "contexture-eval",
            "corpus",
            "--chunk-sizes",
            "800,200",
            "--measure",
            "chars",
            "--window-radius",
            "2",
            "--top-k",
            "5",
            "--min-relevance",
            "0.4",
        ]);

        let build = build_params(&args);
        assert_eq!(build.chunking.sizes, vec![800, 200]);
        assert_eq!(build.chunking.measure, SizeMeasure::Chars);
        assert_eq!(build.window.radius, 2);

        let retrieval = retrieval_params(&args);
        assert_eq!(retrieval.top_k, 5);
        assert_eq!(retrieval.min_relevance, Some(0.4));
        assert_eq!(
            retrieval.top_n,
            RetrievalParams::default().top_n,
            "unset flags keep defaults"
        );
    }

    #[test]
    fn test_mean_cells_disclose_absence() {
        assert_eq!(mean_cell(Some(0.5)), "0.500");
        assert_eq!(mean_cell(None), "-");
    }
}
