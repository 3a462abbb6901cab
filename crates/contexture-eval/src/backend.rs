//! Capability backends for the harness.
//!
//! `offline` wires the deterministic in-process capabilities from
//! `contexture_core::capability::offline`; `openai` speaks the
//! OpenAI-compatible HTTP surface (embeddings + chat completions) through
//! one pooled client serving all three capability roles. Both produce the
//! same [`Capabilities`] bundle, so nothing downstream branches on the
//! backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::ValueEnum;
use contexture_core::capability::offline::{ExtractiveGenerator, HashEmbedder, LexicalJudge};
use contexture_core::capability::{
    Embedder, Generation, Generator, Judge, JudgeTask, Judgment, TokenUsage,
};
use contexture_core::error::CapabilityError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Embedding dimension assumed for remote models when none is given.
pub const DEFAULT_REMOTE_DIMENSION: usize = 1536;

/// Flat per-token price estimate applied to remote usage totals. Real
/// prices vary by model; this keeps cost columns comparable, not exact.
const REMOTE_COST_PER_TOKEN: f64 = 1e-6;

/// HTTP timeout for one remote call. The engine applies its own tighter
/// per-capability deadline on top.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

const ANSWER_SYSTEM_PROMPT: &str = "Answer the question using only the provided context. \
    If the context does not contain the answer, say that it does not instead of guessing.";

const JUDGE_SYSTEM_PROMPT: &str =
    "You are a strict grader. Respond with a single integer and nothing else.";

/// Which capability implementations a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Deterministic in-process capabilities; no network, no keys.
    Offline,
    /// OpenAI-compatible HTTP API for embeddings, generation, and judging.
    Openai,
}

/// The capability bundle every engine and the evaluator share.
///
/// One embedder serves the corpus build and all engines, one generator and
/// one judge serve everything else, so triad differences isolate retrieval
/// strategy rather than backend drift.
#[derive(Clone)]
pub struct Capabilities {
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub judge: Arc<dyn Judge>,
}

impl Capabilities {
    /// Deterministic in-process backend. `dimension` sizes the hash
    /// embedder; `None` keeps its default.
    pub fn offline(dimension: Option<usize>) -> Self {
        let embedder = match dimension {
            Some(dimension) => HashEmbedder::new(dimension),
            None => HashEmbedder::default(),
        };
        Self {
            embedder: Arc::new(embedder),
            generator: Arc::new(ExtractiveGenerator::default()),
            judge: Arc::new(LexicalJudge),
        }
    }

    /// Remote backend; one client instance fills all three roles.
    pub fn openai(backend: OpenAiBackend) -> Self {
        let backend = Arc::new(backend);
        Self {
            embedder: backend.clone(),
            generator: backend.clone(),
            judge: backend,
        }
    }
}

// =============================================================================
// OpenAI-compatible backend
// =============================================================================

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub api_key: String,
    pub embed_model: String,
    /// Chat model used for both generation and judging.
    pub chat_model: String,
    /// Vector dimension the embedding model produces.
    pub dimension: usize,
}

/// Remote capability provider over `reqwest`.
pub struct OpenAiBackend {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("contexture-eval/0.1.0")
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client, config })
    }

    async fn post_json<Req, Resp>(
        &self,
        operation: &'static str,
        path: &str,
        request: &Req,
    ) -> Result<Resp, CapabilityError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| CapabilityError::Transport(format!("{operation}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Unavailable(format!(
                "{operation} returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CapabilityError::Malformed {
                operation,
                detail: e.to_string(),
            })
    }

    async fn chat(
        &self,
        operation: &'static str,
        system: &str,
        user: String,
    ) -> Result<(String, TokenUsage), CapabilityError> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: 0.0,
        };
        let response: ChatResponse = self
            .post_json(operation, "chat/completions", &request)
            .await?;
        let ChatResponse { choices, usage } = response;
        let content = choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| CapabilityError::Malformed {
                operation,
                detail: "response carried no choices".to_string(),
            })?;
        let usage = TokenUsage {
            prompt: usage.prompt_tokens,
            completion: usage.completion_tokens,
        };
        debug!(operation, tokens = usage.total(), "remote chat call");
        Ok((content, usage))
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ChatUsage,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[async_trait]
impl Embedder for OpenAiBackend {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CapabilityError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingsRequest {
            model: &self.config.embed_model,
            input: texts,
        };
        let mut response: EmbeddingsResponse =
            self.post_json("embed", "embeddings", &request).await?;
        if response.data.len() != texts.len() {
            return Err(CapabilityError::Malformed {
                operation: "embed",
                detail: format!(
                    "{} inputs produced {} vectors",
                    texts.len(),
                    response.data.len()
                ),
            });
        }
        response.data.sort_by_key(|row| row.index);
        Ok(response.data.into_iter().map(|row| row.embedding).collect())
    }
}

#[async_trait]
impl Generator for OpenAiBackend {
    async fn generate(
        &self,
        query: &str,
        contexts: &[String],
    ) -> Result<Generation, CapabilityError> {
        let prompt = format!(
            "Context:\n{}\n\nQuestion: {query}",
            contexts.join("\n\n")
        );
        let (answer, usage) = self.chat("generate", ANSWER_SYSTEM_PROMPT, prompt).await?;
        Ok(Generation {
            answer,
            usage,
            cost: usage.total() as f64 * REMOTE_COST_PER_TOKEN,
        })
    }
}

#[async_trait]
impl Judge for OpenAiBackend {
    async fn judge(
        &self,
        task: JudgeTask,
        left: &str,
        right: &str,
    ) -> Result<Judgment, CapabilityError> {
        let prompt = judge_prompt(task, left, right);
        let (reply, _) = self.chat("judge", JUDGE_SYSTEM_PROMPT, prompt).await?;
        let score = parse_judge_score(&reply).ok_or_else(|| CapabilityError::Malformed {
            operation: "judge",
            detail: format!("no integer score in {reply:?}"),
        })?;
        Ok(Judgment::new(score).with_rationale(reply))
    }
}

/// Task-specific grading question. The pair ordering follows the judge
/// contract: context relevance and answer relevance take the query on the
/// left, support takes the evidence on the left.
fn judge_prompt(task: JudgeTask, left: &str, right: &str) -> String {
    match task {
        JudgeTask::ContextRelevance => format!(
            "How relevant is this context to the question?\n\n\
             Question: {left}\n\nContext: {right}\n\n\
             Respond with a single integer from 0 (irrelevant) to 10 (directly relevant)."
        ),
        JudgeTask::AnswerRelevance => format!(
            "How well does this answer address the question?\n\n\
             Question: {left}\n\nAnswer: {right}\n\n\
             Respond with a single integer from 0 (off topic) to 10 (fully addresses it)."
        ),
        JudgeTask::Support => format!(
            "How well does the evidence support the claim?\n\n\
             Evidence: {left}\n\nClaim: {right}\n\n\
             Respond with a single integer from 0 (unsupported) to 10 (fully supported)."
        ),
    }
}

/// Pulls the first integer out of a judge reply and maps it onto [0, 1].
/// Accepts shapes like `7`, `7/10`, and `Score: 7`; anything above 10
/// clamps.
fn parse_judge_score(reply: &str) -> Option<f32> {
    let digits: String = reply
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let value: u32 = digits.parse().ok()?;
    Some(value.min(10) as f32 / 10.0)
}
