use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DocumentChunk, SearchHit, WebResult};

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Scores (query, passage) pairs independently; higher is more relevant.
pub trait PairScorer: Send + Sync {
    fn name(&self) -> &str;
    fn score_pairs(&self, query: &str, passages: &[String]) -> anyhow::Result<Vec<f32>>;
}

#[async_trait]
pub trait SemanticSearch: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>>;

    /// Every chunk held by the index, in build order.
    fn chunks(&self) -> &[DocumentChunk];
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn provider(&self) -> &str;
    fn model(&self) -> &str;
    async fn invoke(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>>;
}
