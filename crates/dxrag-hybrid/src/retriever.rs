//! Query → formatted context block.
//!
//! Expand the query, pull semantic candidates for every variant and lexical
//! candidates for the first few, de-duplicate by content hash, rerank, render.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use dxrag_core::config::RetrievalSettings;
use dxrag_core::error::{Error, Result};
use dxrag_core::traits::SemanticSearch;
use dxrag_core::types::{DocumentChunk, SearchHit};
use dxrag_text::{Bm25Index, Bm25Params};

use crate::expand::expand;
use crate::rerank::{RankedChunk, Reranker};

/// Returned instead of a context block when retrieval finds nothing.
pub const NO_DOCUMENTS_SENTINEL: &str = "No relevant documents found in medical reference library.";

pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone)]
pub struct RetrievalParams {
    pub top_k_initial: usize,
    pub top_k_lexical: usize,
    pub lexical_variants: usize,
    pub top_k_reranked: usize,
    pub context_chars: usize,
}

impl From<&RetrievalSettings> for RetrievalParams {
    fn from(s: &RetrievalSettings) -> Self {
        Self {
            top_k_initial: s.top_k_initial,
            top_k_lexical: s.top_k_lexical,
            lexical_variants: s.lexical_variants,
            top_k_reranked: s.top_k_reranked,
            context_chars: s.context_chars,
        }
    }
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self::from(&RetrievalSettings::default())
    }
}

/// Result of searching one query variant.
#[derive(Debug)]
pub enum VariantOutcome {
    Hits(Vec<SearchHit>),
    Empty,
    Failed(Error),
}

impl VariantOutcome {
    fn from_result(result: Result<Vec<SearchHit>>) -> Self {
        match result {
            Ok(hits) if hits.is_empty() => Self::Empty,
            Ok(hits) => Self::Hits(hits),
            Err(e) => Self::Failed(e),
        }
    }
}

/// De-duplicated candidate pool in arrival order.
#[derive(Default)]
struct CandidatePool {
    seen: HashSet<String>,
    chunks: Vec<DocumentChunk>,
}

impl CandidatePool {
    fn extend(&mut self, hits: Vec<SearchHit>) {
        for hit in hits {
            if self.seen.insert(hit.chunk.id.clone()) {
                self.chunks.push(hit.chunk);
            }
        }
    }
}

pub struct HybridRetriever {
    semantic: Arc<dyn SemanticSearch>,
    lexical: Option<Bm25Index>,
    reranker: Reranker,
    params: RetrievalParams,
}

impl HybridRetriever {
    pub fn new(
        semantic: Arc<dyn SemanticSearch>,
        lexical: Option<Bm25Index>,
        reranker: Reranker,
        params: RetrievalParams,
    ) -> Self {
        Self { semantic, lexical, reranker, params }
    }

    /// Build the BM25 side from the chunks the semantic index already holds.
    pub fn from_semantic(semantic: Arc<dyn SemanticSearch>, settings: &RetrievalSettings, reranker: Reranker) -> Self {
        let chunks = semantic.chunks().to_vec();
        let lexical = (!chunks.is_empty())
            .then(|| Bm25Index::build(chunks, Bm25Params { k1: settings.bm25_k1, b: settings.bm25_b }));
        Self::new(semantic, lexical, reranker, RetrievalParams::from(settings))
    }

    /// Backends in play, e.g. `Vector+BM25+CrossEncoderRerank`.
    pub fn description(&self) -> String {
        let mut parts = vec!["Vector"];
        if self.lexical.is_some() {
            parts.push("BM25");
        }
        parts.push(self.reranker.label());
        parts.join("+")
    }

    pub fn reranker(&self) -> &Reranker {
        &self.reranker
    }

    /// Candidate pool for `query` before reranking.
    pub async fn candidates(&self, query: &str) -> Vec<DocumentChunk> {
        let variants = expand(query);
        let mut pool = CandidatePool::default();

        let searches = variants.iter().map(|v| self.semantic.search(v, self.params.top_k_initial));
        let outcomes: Vec<VariantOutcome> = join_all(searches).await.into_iter().map(VariantOutcome::from_result).collect();
        for (variant, outcome) in variants.iter().zip(outcomes) {
            match outcome {
                VariantOutcome::Hits(hits) => pool.extend(hits),
                VariantOutcome::Empty => debug!(variant = %variant, "No semantic hits"),
                VariantOutcome::Failed(e) => warn!(variant = %variant, error = %e, "Semantic search failed for variant, skipping"),
            }
        }

        if let Some(bm25) = &self.lexical {
            for variant in variants.iter().take(self.params.lexical_variants) {
                pool.extend(bm25.search(variant, self.params.top_k_lexical));
            }
        }

        debug!(variants = variants.len(), candidates = pool.chunks.len(), "Collected candidates");
        pool.chunks
    }

    /// Reranked top chunks for `query`; empty when nothing matched.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RankedChunk>> {
        let candidates = self.candidates(query).await;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let reranker = self.reranker.clone();
        let query = query.to_string();
        let top_k = self.params.top_k_reranked;
        tokio::task::spawn_blocking(move || reranker.rerank(&query, candidates, top_k))
            .await
            .map_err(|e| Error::Rerank(e.to_string()))?
    }

    /// Formatted context block, or [`NO_DOCUMENTS_SENTINEL`].
    pub async fn retrieve_context(&self, query: &str) -> Result<String> {
        let ranked = self.retrieve(query).await?;
        if ranked.is_empty() {
            info!("No documents matched query");
            return Ok(NO_DOCUMENTS_SENTINEL.to_string());
        }
        info!(chunks = ranked.len(), backend = %self.description(), "Assembled context");
        Ok(render_context(&ranked, self.params.context_chars))
    }
}

/// `[Source: <name>, Page <n>]` header plus the first `chars` characters of
/// each chunk, joined by [`CONTEXT_SEPARATOR`].
pub fn render_context(ranked: &[RankedChunk], chars: usize) -> String {
    ranked
        .iter()
        .map(|r| {
            let excerpt: String = r.chunk.content.chars().take(chars).collect();
            format!("[Source: {}, Page {}]\n{}", r.chunk.metadata.source_name, r.chunk.metadata.page_number, excerpt)
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}
