//! Engine façade: three retrieval strategies over one store.
//!
//! An engine binds a strategy to a read-only store and a capability set.
//! All strategies share the embedder, generator, judge, and retrieval
//! parameters through one [`EngineConfig`], so comparing their triad
//! scores isolates the retrieval strategy itself. Engines hold no per-query
//! state; one instance serves any number of concurrent queries.

use crate::capability::{call_with_timeout, Embedder, Generator, Judge, TokenUsage};
use crate::config::{RetrievalParams, DEFAULT_CAPABILITY_TIMEOUT};
use crate::corpus::store::UnitStore;
use crate::corpus::types::{ContextSpan, ScoredUnit};
use crate::error::{ConfigError, EngineError};
use crate::retrieval::merge::{auto_merge, resolved_spans};
use crate::retrieval::rerank::rerank_spans;
use crate::retrieval::retriever::top_k_by_similarity;
use crate::retrieval::window::resolve_windows;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// The three retrieval strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Top-k leaf chunks, returned as retrieved.
    Direct,
    /// Top-k sentences, reranked, widened to their windows.
    SentenceWindow,
    /// Top-k leaf chunks, auto-merged up the hierarchy, reranked.
    AutoMerging,
}

impl EngineKind {
    /// Every strategy, in comparison order.
    pub const ALL: [EngineKind; 3] = [
        EngineKind::Direct,
        EngineKind::SentenceWindow,
        EngineKind::AutoMerging,
    ];

    /// Stable identifier used in reports and leaderboard keys.
    pub fn label(self) -> &'static str {
        match self {
            EngineKind::Direct => "direct",
            EngineKind::SentenceWindow => "sentence_window",
            EngineKind::AutoMerging => "auto_merging",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Shared capability and parameter set for a comparison run.
///
/// Clones share the underlying capabilities, which is what makes engines
/// built from one config provably identical apart from their strategy.
#[derive(Clone)]
pub struct EngineConfig {
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub judge: Arc<dyn Judge>,
    pub retrieval: RetrievalParams,
    /// Per-capability-call timeout.
    pub timeout: Duration,
}

impl EngineConfig {
    /// Builds a config with default retrieval parameters and timeout.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        judge: Arc<dyn Judge>,
    ) -> Self {
        Self {
            embedder,
            generator,
            judge,
            retrieval: RetrievalParams::default(),
            timeout: DEFAULT_CAPABILITY_TIMEOUT,
        }
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalParams) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A successfully answered query.
#[derive(Debug, Clone, Serialize)]
pub struct EngineAnswer {
    /// Context spans handed to the generator, in final resolution order.
    pub spans: Vec<ContextSpan>,
    pub answer: String,
    pub usage: TokenUsage,
    pub cost: f64,
    pub latency: Duration,
}

/// Outcome of one query against one engine.
#[derive(Debug, Clone, Serialize)]
pub enum QueryOutcome {
    /// Context cleared the guardrail and an answer was generated.
    Answered(EngineAnswer),
    /// No retrieved context cleared the configured minimum relevance; the
    /// engine declines to answer rather than generating from noise.
    InsufficientContext {
        /// Best relevance seen, if any context was retrieved at all.
        best_relevance: Option<f32>,
        latency: Duration,
    },
}

impl QueryOutcome {
    /// True when the engine produced an answer.
    pub fn is_answered(&self) -> bool {
        matches!(self, QueryOutcome::Answered(_))
    }
}

/// One retrieval strategy bound to a store and capability set.
pub struct ContextEngine {
    kind: EngineKind,
    store: Arc<UnitStore>,
    config: EngineConfig,
}

impl ContextEngine {
    /// Creates an engine after validating the retrieval parameters.
    pub fn new(
        kind: EngineKind,
        store: Arc<UnitStore>,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.retrieval.validate()?;
        Ok(Self { kind, store, config })
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn store(&self) -> &UnitStore {
        &self.store
    }

    /// Answers a query with this engine's strategy.
    ///
    /// # Errors
    ///
    /// Embedding and generation failures surface as [`EngineError::Capability`];
    /// they spoil this query only, never the store. A blank query is a
    /// usage error.
    #[instrument(skip_all, fields(engine = %self.kind, query_len = query.len()))]
    pub async fn query(&self, query: &str) -> Result<QueryOutcome, EngineError> {
        let started = Instant::now();
        if query.trim().is_empty() {
            return Err(EngineError::EmptyQuery);
        }

        let embedding = call_with_timeout(
            "embed",
            self.config.timeout,
            self.config.embedder.embed(query),
        )
        .await?;

        let spans = self.resolve_context(query, &embedding).await;
        debug!(spans = spans.len(), "context resolved");

        if let Some(minimum) = self.config.retrieval.min_relevance {
            let best = spans
                .iter()
                .map(|s| s.score)
                .fold(None, |best: Option<f32>, score| {
                    Some(best.map_or(score, |b| b.max(score)))
                });
            if !best.is_some_and(|b| b >= minimum) {
                info!(?best, minimum, "declining to answer, context below guardrail");
                return Ok(QueryOutcome::InsufficientContext {
                    best_relevance: best,
                    latency: started.elapsed(),
                });
            }
        }

        let context_texts: Vec<String> = spans.iter().map(|s| s.text.clone()).collect();
        let generation = call_with_timeout(
            "generate",
            self.config.timeout,
            self.config.generator.generate(query, &context_texts),
        )
        .await?;

        Ok(QueryOutcome::Answered(EngineAnswer {
            spans,
            answer: generation.answer,
            usage: generation.usage,
            cost: generation.cost,
            latency: started.elapsed(),
        }))
    }

    /// Runs the strategy-specific retrieval pipeline.
    async fn resolve_context(&self, query: &str, embedding: &[f32]) -> Vec<ContextSpan> {
        let params = &self.config.retrieval;
        match self.kind {
            EngineKind::Direct => {
                let hits =
                    top_k_by_similarity(embedding, self.store.leaf_pool(), params.top_k);
                hits.iter()
                    .filter_map(|hit| {
                        self.store
                            .unit(hit.id)
                            .map(|unit| ContextSpan::for_unit(unit, hit.score))
                    })
                    .collect()
            }
            EngineKind::SentenceWindow => {
                let hits =
                    top_k_by_similarity(embedding, self.store.sentence_pool(), params.top_k);
                let sentence_spans: Vec<ContextSpan> = hits
                    .iter()
                    .filter_map(|hit| {
                        self.store
                            .unit(hit.id)
                            .map(|unit| ContextSpan::for_unit(unit, hit.score))
                    })
                    .collect();
                let kept = rerank_spans(
                    self.config.judge.as_ref(),
                    query,
                    sentence_spans,
                    params.top_n,
                    self.config.timeout,
                )
                .await;
                let survivors: Vec<ScoredUnit> = kept
                    .iter()
                    .filter_map(|span| {
                        span.units.first().map(|&id| ScoredUnit::new(id, span.score))
                    })
                    .collect();
                resolve_windows(&self.store, &survivors)
            }
            EngineKind::AutoMerging => {
                let hits =
                    top_k_by_similarity(embedding, self.store.leaf_pool(), params.top_k);
                let resolved = auto_merge(&self.store, &hits, params.merge_threshold);
                let spans = resolved_spans(&self.store, &resolved);
                rerank_spans(
                    self.config.judge.as_ref(),
                    query,
                    spans,
                    params.top_n,
                    self.config.timeout,
                )
                .await
            }
        }
    }
}

impl fmt::Debug for ContextEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextEngine")
            .field("kind", &self.kind)
            .field("units", &self.store.unit_count())
            .field("retrieval", &self.config.retrieval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::offline::{ExtractiveGenerator, HashEmbedder, LexicalJudge};
    use crate::config::{BuildParams, ChunkingParams, SizeMeasure, WindowParams};
    use crate::corpus::build::CorpusBuilder;
    use crate::corpus::types::UnitKind;

    fn offline_config() -> EngineConfig {
        EngineConfig::new(
            Arc::new(HashEmbedder::new(64)),
            Arc::new(ExtractiveGenerator::default()),
            Arc::new(LexicalJudge::default()),
        )
    }

    async fn garden_store() -> Arc<UnitStore> {
        let params = BuildParams {
            chunking: ChunkingParams {
                sizes: vec![300, 80],
                measure: SizeMeasure::Chars,
            },
            window: WindowParams { radius: 1 },
        };
        let corpus = vec![
            (
                "compost.md".to_string(),
                "Compost piles need a balance of green and brown material. \
                 Green material supplies nitrogen for the bacteria. Brown \
                 material supplies carbon and keeps air pockets open. Turning \
                 the pile every week speeds decomposition. Finished compost \
                 smells earthy and crumbles easily."
                    .to_string(),
            ),
            (
                "pruning.md".to_string(),
                "Prune fruit trees while they are dormant in late winter. \
                 Remove crossing branches first to open the canopy. Clean cuts \
                 heal faster than ragged tears. Sharp tools make clean cuts."
                    .to_string(),
            ),
        ];
        let store = CorpusBuilder::new(params, Arc::new(HashEmbedder::new(64)))
            .unwrap()
            .build(&corpus)
            .await
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_direct_returns_leaf_spans_as_retrieved() {
        let store = garden_store().await;
        let engine =
            ContextEngine::new(EngineKind::Direct, store.clone(), offline_config()).unwrap();

        let outcome = engine.query("how do I turn a compost pile").await.unwrap();
        let QueryOutcome::Answered(answer) = outcome else {
            panic!("expected an answer");
        };

        assert!(!answer.spans.is_empty());
        assert!(answer.spans.len() <= crate::config::DEFAULT_TOP_K);
        for span in &answer.spans {
            let unit = store.unit(span.units[0]).unwrap();
            assert_eq!(unit.kind, UnitKind::LeafChunk);
            assert_eq!(span.text, unit.text, "direct spans are bare leaf text");
        }
        assert!(!answer.answer.is_empty());
    }

    #[tokio::test]
    async fn test_sentence_window_spans_are_wider_than_one_sentence() {
        let store = garden_store().await;
        let engine =
            ContextEngine::new(EngineKind::SentenceWindow, store.clone(), offline_config())
                .unwrap();

        let outcome = engine
            .query("what does green material supply")
            .await
            .unwrap();
        let QueryOutcome::Answered(answer) = outcome else {
            panic!("expected an answer");
        };

        assert!(!answer.spans.is_empty());
        // Radius 1 in the fixture: any interior hit spans several sentences.
        let widened = answer.spans.iter().any(|s| s.units.len() > 1);
        assert!(widened, "windows widen interior sentence hits");
        for span in &answer.spans {
            for &id in &span.units {
                assert_eq!(store.unit(id).unwrap().kind, UnitKind::Sentence);
            }
        }
    }

    #[tokio::test]
    async fn test_auto_merging_collapses_full_sibling_groups() {
        // Single document, so every leaf shares the one root; retrieving
        // the whole pool forces full coverage at the parent.
        let params = BuildParams {
            chunking: ChunkingParams {
                sizes: vec![400, 90],
                measure: SizeMeasure::Chars,
            },
            window: WindowParams { radius: 1 },
        };
        let text = "Solar panels convert sunlight into electricity for the home. \
                    Inverters turn direct current into usable alternating current. \
                    Batteries store surplus energy for use after sunset. Monitoring \
                    software tracks the output of every panel in the array.";
        let store = Arc::new(
            CorpusBuilder::new(params, Arc::new(HashEmbedder::new(64)))
                .unwrap()
                .build(&[("solar.md".to_string(), text.to_string())])
                .await
                .unwrap(),
        );
        let leaf_count = store.leaf_pool().count();
        assert!(leaf_count >= 2, "fixture must split into multiple leaves");

        let config = offline_config().with_retrieval(RetrievalParams {
            top_k: leaf_count,
            top_n: 4,
            merge_threshold: 0.5,
            min_relevance: None,
        });
        let engine = ContextEngine::new(EngineKind::AutoMerging, store.clone(), config).unwrap();

        let outcome = engine.query("solar energy storage").await.unwrap();
        let QueryOutcome::Answered(answer) = outcome else {
            panic!("expected an answer");
        };

        assert_eq!(answer.spans.len(), 1, "full coverage merges to the root");
        assert_eq!(answer.spans[0].text, text, "root span carries the whole document");
    }

    #[tokio::test]
    async fn test_low_relevance_context_declines_to_answer() {
        let store = garden_store().await;
        let config = offline_config().with_retrieval(RetrievalParams {
            top_k: 4,
            top_n: 2,
            merge_threshold: 0.5,
            min_relevance: Some(0.95),
        });
        let engine = ContextEngine::new(EngineKind::Direct, store, config).unwrap();

        let outcome = engine.query("zebra migration patterns").await.unwrap();
        match outcome {
            QueryOutcome::InsufficientContext { best_relevance, .. } => {
                let best = best_relevance.expect("pool is non-empty");
                assert!(best < 0.95);
            }
            QueryOutcome::Answered(_) => panic!("guardrail should refuse this query"),
        }
    }

    #[tokio::test]
    async fn test_blank_queries_are_rejected() {
        let store = garden_store().await;
        let engine = ContextEngine::new(EngineKind::Direct, store, offline_config()).unwrap();

        let err = engine.query("   ").await.expect_err("blank query");
        assert!(matches!(err, EngineError::EmptyQuery));
    }

    #[tokio::test]
    async fn test_one_config_drives_all_three_strategies() {
        let store = garden_store().await;
        let config = offline_config();

        for kind in EngineKind::ALL {
            let engine = ContextEngine::new(kind, store.clone(), config.clone()).unwrap();
            let outcome = engine.query("when should fruit trees be pruned").await.unwrap();
            assert!(outcome.is_answered(), "{kind} failed to answer");
        }
    }

    #[tokio::test]
    async fn test_invalid_retrieval_params_are_rejected_at_construction() {
        let store = garden_store().await;
        let config = offline_config().with_retrieval(RetrievalParams {
            top_k: 0,
            top_n: 2,
            merge_threshold: 0.5,
            min_relevance: None,
        });
        let err = ContextEngine::new(EngineKind::Direct, store, config)
            .expect_err("top_k of zero");
        assert!(matches!(err, ConfigError::InvalidTopK(0)));
    }

    #[tokio::test]
    async fn test_engine_debug_output_names_the_strategy() {
        let store = garden_store().await;
        let engine =
            ContextEngine::new(EngineKind::AutoMerging, store, offline_config()).unwrap();
        let rendered = format!("{engine:?}");
        assert!(rendered.contains("AutoMerging"), "{rendered}");
    }
}
