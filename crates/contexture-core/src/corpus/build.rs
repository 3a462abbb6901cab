//! Corpus builder: documents in, verified unit store out.
//!
//! For every (source id, text) pair the builder derives the chunk hierarchy
//! and the sentence/window sequence, embeds the retrievable units in one
//! batch per document, and appends everything to the store. Builds are
//! sequential and deterministic: the same corpus under the same parameters
//! produces byte-identical stores, which is what makes snapshot
//! fingerprinting sound.
//!
//! The store is verified for link consistency before it is returned; a
//! build that fails verification aborts rather than yielding a corrupt
//! tree.

use crate::capability::{call_with_timeout, Embedder};
use crate::chunking::{
    chunk_hierarchy, split_sentences, window_range, CharSizer, EstimatedTokenSizer, RawChunk,
};
use crate::config::{BuildParams, SizeMeasure, DEFAULT_CAPABILITY_TIMEOUT};
use crate::corpus::persist::corpus_fingerprint;
use crate::corpus::store::UnitStore;
use crate::corpus::types::{DocumentRecord, Unit, UnitId, UnitKind};
use crate::error::{BuildError, CapabilityError, ConfigError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Builds [`UnitStore`]s from corpora.
///
/// One builder instance carries one validated parameter set and one
/// embedder; every store it produces is comparable with the others.
pub struct CorpusBuilder {
    params: BuildParams,
    embedder: Arc<dyn Embedder>,
    timeout: Duration,
    #[cfg(feature = "hf-tokenizer")]
    tokenizer: Option<tokenizers::Tokenizer>,
}

impl CorpusBuilder {
    /// Creates a builder after validating the build parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the chunk-size ladder is empty, has a
    /// zero entry, or is not strictly decreasing.
    pub fn new(params: BuildParams, embedder: Arc<dyn Embedder>) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            params,
            embedder,
            timeout: DEFAULT_CAPABILITY_TIMEOUT,
            #[cfg(feature = "hf-tokenizer")]
            tokenizer: None,
        })
    }

    /// Overrides the per-call embedding timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Supplies a tokenizer for exact token sizing. Only meaningful when
    /// the size measure is [`SizeMeasure::Tokens`].
    #[cfg(feature = "hf-tokenizer")]
    pub fn with_tokenizer(mut self, tokenizer: tokenizers::Tokenizer) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Builds a verified store over the given corpus.
    ///
    /// `corpus` is an ordered sequence of (source id, raw text) pairs;
    /// ordering is part of the fingerprint.
    ///
    /// # Errors
    ///
    /// Fails on embedding capability errors and on link-consistency
    /// violations; both abort the build.
    #[instrument(skip_all, fields(documents = corpus.len()))]
    pub async fn build(&self, corpus: &[(String, String)]) -> Result<UnitStore, BuildError> {
        let fingerprint = corpus_fingerprint(corpus, &self.params)?;
        let mut store = UnitStore::new(self.params.clone(), fingerprint);

        for (source_id, text) in corpus {
            self.build_document(&mut store, source_id, text).await?;
        }

        store.set_embedding_dimension(self.embedder.dimension());
        store.verify_consistency()?;
        info!(
            documents = store.document_count(),
            units = store.unit_count(),
            fingerprint = %store.fingerprint(),
            "corpus build complete"
        );
        Ok(store)
    }

    /// Loads a cached snapshot for this corpus, or builds and caches one.
    ///
    /// Snapshots live under `cache_dir`, one subdirectory per fingerprint.
    /// An unusable snapshot (stale schema, failed verification, truncated
    /// files) is logged and rebuilt rather than treated as fatal.
    #[instrument(skip_all, fields(cache_dir = %cache_dir.display()))]
    pub async fn load_or_build(
        &self,
        corpus: &[(String, String)],
        cache_dir: &std::path::Path,
    ) -> Result<UnitStore, BuildError> {
        let fingerprint = corpus_fingerprint(corpus, &self.params)?;
        let dir = cache_dir.join(&fingerprint[..16]);

        if dir.join(crate::corpus::persist::MANIFEST_FILE).exists() {
            match crate::corpus::persist::load(&dir, &fingerprint) {
                Ok(store) => {
                    info!(units = store.unit_count(), "reusing cached snapshot");
                    return Ok(store);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "cached snapshot unusable, rebuilding");
                }
            }
        }

        let store = self.build(corpus).await?;
        crate::corpus::persist::save(&store, &dir)?;
        Ok(store)
    }

    /// Derives, embeds, and appends one document's units.
    async fn build_document(
        &self,
        store: &mut UnitStore,
        source_id: &str,
        text: &str,
    ) -> Result<(), BuildError> {
        let doc = store.next_document_id();

        let raw_chunks = self.run_chunker(text);
        let sentences = split_sentences(text);
        debug!(
            source_id,
            chunks = raw_chunks.len(),
            sentences = sentences.len(),
            "document decomposed"
        );

        // Mint ids up front; window members and child links need them
        // before the units exist.
        let chunk_ids: Vec<UnitId> = raw_chunks.iter().map(|_| store.mint_unit_id()).collect();
        let sentence_ids: Vec<UnitId> = sentences.iter().map(|_| store.mint_unit_id()).collect();

        let deepest = self.params.chunking.depth() - 1;
        let leaf_texts: Vec<String> = raw_chunks
            .iter()
            .filter(|c| c.level == deepest)
            .map(|c| text[c.span.start..c.span.end].to_string())
            .collect();
        let sentence_texts: Vec<String> = sentences.iter().map(|s| s.text.clone()).collect();

        let mut embeddings = self.embed_retrievable(&leaf_texts, &sentence_texts).await?;
        let mut sentence_embeddings = embeddings.split_off(leaf_texts.len());
        let mut leaf_embeddings = embeddings;

        // Hierarchy units, level order; leaves take embeddings in document
        // order because the raw layout keeps each level document-ordered.
        let mut leaf_cursor = 0;
        for (idx, raw) in raw_chunks.iter().enumerate() {
            let is_leaf = raw.level == deepest;
            let embedding = if is_leaf {
                let e = leaf_embeddings.get_mut(leaf_cursor).map(std::mem::take);
                leaf_cursor += 1;
                e
            } else {
                None
            };
            store.insert_unit(Unit {
                id: chunk_ids[idx],
                doc,
                kind: if is_leaf {
                    UnitKind::LeafChunk
                } else {
                    UnitKind::ParentChunk
                },
                level: raw.level,
                ordinal: raw.ordinal,
                text: text[raw.span.start..raw.span.end].to_string(),
                span: raw.span,
                embedding,
                window: None,
                parent_id: raw.parent.map(|p| chunk_ids[p]),
                child_ids: raw.children.iter().map(|&c| chunk_ids[c]).collect(),
            });
        }

        // Sentence units with their windows.
        let radius = self.params.window.radius;
        for (idx, sentence) in sentences.iter().enumerate() {
            let (first, last) = window_range(idx, radius, sentences.len());
            let window = sentence_ids[first..=last].to_vec();
            store.insert_unit(Unit {
                id: sentence_ids[idx],
                doc,
                kind: UnitKind::Sentence,
                level: 0,
                ordinal: sentence.ordinal,
                text: sentence.text.clone(),
                span: sentence.span,
                embedding: sentence_embeddings.get_mut(idx).map(std::mem::take),
                window: Some(window),
                parent_id: None,
                child_ids: Vec::new(),
            });
        }

        store.insert_document(DocumentRecord {
            id: doc,
            source_id: source_id.to_string(),
            text: text.to_string(),
            root_ids: raw_chunks
                .iter()
                .enumerate()
                .filter(|(_, c)| c.level == 0)
                .map(|(i, _)| chunk_ids[i])
                .collect(),
            sentence_ids,
        });
        Ok(())
    }

    /// Splits with the sizer matching the configured measure.
    fn run_chunker(&self, text: &str) -> Vec<RawChunk> {
        let sizes = &self.params.chunking.sizes;
        match self.params.chunking.measure {
            SizeMeasure::Chars => chunk_hierarchy(text, sizes, CharSizer),
            SizeMeasure::Tokens => {
                #[cfg(feature = "hf-tokenizer")]
                if let Some(tokenizer) = &self.tokenizer {
                    let sizer = crate::chunking::HfTokenizerSizer { tokenizer };
                    return chunk_hierarchy(text, sizes, sizer);
                }
                chunk_hierarchy(text, sizes, EstimatedTokenSizer)
            }
        }
    }

    /// Embeds leaf and sentence texts in one batch, validating shape.
    async fn embed_retrievable(
        &self,
        leaf_texts: &[String],
        sentence_texts: &[String],
    ) -> Result<Vec<Vec<f32>>, BuildError> {
        let mut batch = Vec::with_capacity(leaf_texts.len() + sentence_texts.len());
        batch.extend_from_slice(leaf_texts);
        batch.extend_from_slice(sentence_texts);
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = call_with_timeout(
            "embed",
            self.timeout,
            self.embedder.embed_batch(&batch),
        )
        .await?;

        if vectors.len() != batch.len() {
            return Err(CapabilityError::Malformed {
                operation: "embed",
                detail: format!("asked for {} vectors, got {}", batch.len(), vectors.len()),
            }
            .into());
        }
        let expected = self.embedder.dimension();
        for vector in &vectors {
            if vector.len() != expected {
                return Err(CapabilityError::Malformed {
                    operation: "embed",
                    detail: format!("expected dimension {expected}, got {}", vector.len()),
                }
                .into());
            }
        }
        Ok(vectors)
    }
}

impl fmt::Debug for CorpusBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("CorpusBuilder");
        s.field("params", &self.params)
            .field("embedder", &"<dyn Embedder>")
            .field("timeout", &self.timeout);
        #[cfg(feature = "hf-tokenizer")]
        s.field("tokenizer", &self.tokenizer.is_some());
        s.finish()
    }
}
