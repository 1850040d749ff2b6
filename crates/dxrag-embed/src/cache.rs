//! Process-wide model cache keyed by model name.
//!
//! Loading a transformer is expensive; every index manager and reranker in a
//! process asks the same cache so a model is loaded at most once. Tests build
//! their own cache and pre-insert fakes.

use dashmap::DashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

use dxrag_core::traits::{Embedder, PairScorer};

#[derive(Clone, Default)]
pub struct ModelCache {
    embedders: Arc<DashMap<String, Arc<dyn Embedder>>>,
    scorers: Arc<DashMap<String, Arc<dyn PairScorer>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static ModelCache {
        static CACHE: OnceLock<ModelCache> = OnceLock::new();
        CACHE.get_or_init(ModelCache::new)
    }

    pub fn embedder_or_load<F>(&self, name: &str, load: F) -> anyhow::Result<Arc<dyn Embedder>>
    where
        F: FnOnce() -> anyhow::Result<Arc<dyn Embedder>>,
    {
        if let Some(hit) = self.embedders.get(name) {
            debug!(model = name, "Embedder cache hit");
            return Ok(Arc::clone(hit.value()));
        }
        let loaded = load()?;
        // A concurrent loader may have won; keep whichever landed first.
        Ok(Arc::clone(self.embedders.entry(name.to_string()).or_insert(loaded).value()))
    }

    pub fn scorer_or_load<F>(&self, name: &str, load: F) -> anyhow::Result<Arc<dyn PairScorer>>
    where
        F: FnOnce() -> anyhow::Result<Arc<dyn PairScorer>>,
    {
        if let Some(hit) = self.scorers.get(name) {
            debug!(model = name, "Scorer cache hit");
            return Ok(Arc::clone(hit.value()));
        }
        let loaded = load()?;
        Ok(Arc::clone(self.scorers.entry(name.to_string()).or_insert(loaded).value()))
    }

    pub fn insert_embedder(&self, name: &str, embedder: Arc<dyn Embedder>) {
        self.embedders.insert(name.to_string(), embedder);
    }

    pub fn insert_scorer(&self, name: &str, scorer: Arc<dyn PairScorer>) {
        self.scorers.insert(name.to_string(), scorer);
    }

    pub fn loaded_models(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .embedders
            .iter()
            .map(|e| e.key().clone())
            .chain(self.scorers.iter().map(|e| e.key().clone()))
            .collect();
        names.sort();
        names
    }
}
