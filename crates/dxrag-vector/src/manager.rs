//! Index lifecycle: fingerprint check, load, or rebuild.
//!
//! Lookup order for `(docs_dir, index_dir)`:
//! 1. in-process [`IndexCache`] entry with the current fingerprint
//! 2. on-disk index whose sidecar fingerprint matches
//! 3. full rebuild (ingest, chunk, embed, write, swap, then fingerprint)
//!
//! Builds for one key are serialized. A rebuild deletes the directory the
//! previous index was opened from, so handles obtained before it fail on
//! search; callers holding a [`SemanticIndex`] across a rebuild must obtain a
//! new one from [`IndexManager::load_or_build`].

use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::{info, warn};

use dxrag_core::config::{ModelSettings, Settings};
use dxrag_core::data_processor::{list_source_files, ChunkingConfig, DataProcessor};
use dxrag_core::error::{Error, Result};
use dxrag_core::traits::Embedder;
use dxrag_core::types::DocumentChunk;
use dxrag_embed::{get_default_embedder, ModelCache};

use crate::fingerprint::{compute_fingerprint, read_stored, write_stored};
use crate::index::SemanticIndex;
use crate::index_build::{build_ivfpq_index, compute_ivfpq_params};
use crate::table::{embed_progress, open_db, write_chunks};

const EMBED_BATCH: usize = 64;

type CacheKey = (PathBuf, PathBuf);

#[derive(Clone)]
struct CachedIndex {
    fingerprint: String,
    index: Arc<SemanticIndex>,
}

/// Built indexes keyed by `(docs_dir, index_dir)`. Entries carry the
/// fingerprint they were built for and are only served while it still matches.
#[derive(Clone, Default)]
pub struct IndexCache {
    entries: Arc<DashMap<CacheKey, CachedIndex>>,
    builds: Arc<DashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static IndexCache {
        static CACHE: OnceLock<IndexCache> = OnceLock::new();
        CACHE.get_or_init(IndexCache::new)
    }

    fn get(&self, key: &CacheKey, fingerprint: &str) -> Option<Arc<SemanticIndex>> {
        let entry = self.entries.get(key)?;
        (entry.fingerprint == fingerprint).then(|| Arc::clone(&entry.index))
    }

    fn insert(&self, key: CacheKey, fingerprint: String, index: Arc<SemanticIndex>) {
        if let Some(old) = self.entries.insert(key, CachedIndex { fingerprint, index }) {
            let holders = Arc::strong_count(&old.index) - 1;
            if holders > 0 {
                warn!(holders, "Replaced index is still referenced; those handles now point at a removed directory");
            }
        }
    }

    fn build_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        Arc::clone(self.builds.entry(key.clone()).or_default().value())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How a [`LoadedIndex`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    Cached,
    Loaded,
    Built,
}

pub struct LoadedIndex {
    pub index: Arc<SemanticIndex>,
    pub origin: IndexOrigin,
    pub fingerprint: String,
}

pub struct IndexManager {
    models: ModelSettings,
    chunking: ChunkingConfig,
    ann_threshold: usize,
    model_cache: ModelCache,
    index_cache: IndexCache,
}

impl IndexManager {
    /// Manager backed by the process-wide model and index caches.
    pub fn new(settings: &Settings) -> Self {
        Self::with_caches(settings, ModelCache::global().clone(), IndexCache::global().clone())
    }

    pub fn with_caches(settings: &Settings, model_cache: ModelCache, index_cache: IndexCache) -> Self {
        Self {
            models: settings.models.clone(),
            chunking: ChunkingConfig {
                chunk_size: settings.chunking.chunk_size,
                chunk_overlap: settings.chunking.chunk_overlap,
            },
            ann_threshold: settings.retrieval.ann_threshold,
            model_cache,
            index_cache,
        }
    }

    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        get_default_embedder(&self.models, &self.model_cache).map_err(|e| Error::Model(format!("{e:#}")))
    }

    pub async fn load_or_build(&self, docs_dir: &Path, index_dir: &Path) -> Result<LoadedIndex> {
        ensure_corpus(docs_dir)?;
        let fingerprint = compute_fingerprint(docs_dir)?;
        let key = (docs_dir.to_path_buf(), index_dir.to_path_buf());

        if let Some(index) = self.index_cache.get(&key, &fingerprint) {
            info!(docs = %docs_dir.display(), fingerprint = short(&fingerprint), "Index cache hit");
            return Ok(LoadedIndex { index, origin: IndexOrigin::Cached, fingerprint });
        }

        let lock = self.index_cache.build_lock(&key);
        let _guard = lock.lock().await;
        if let Some(index) = self.index_cache.get(&key, &fingerprint) {
            info!(docs = %docs_dir.display(), "Index built by a concurrent caller");
            return Ok(LoadedIndex { index, origin: IndexOrigin::Cached, fingerprint });
        }

        let embedder = self.embedder()?;
        if read_stored(index_dir).as_deref() == Some(fingerprint.as_str()) {
            match SemanticIndex::open(index_dir, Arc::clone(&embedder)).await {
                Ok(index) => {
                    let index = Arc::new(index);
                    info!(index = %index_dir.display(), chunks = index.len(), "Loaded persisted index");
                    self.index_cache.insert(key, fingerprint.clone(), Arc::clone(&index));
                    return Ok(LoadedIndex { index, origin: IndexOrigin::Loaded, fingerprint });
                }
                Err(e) => warn!(index = %index_dir.display(), error = %e, "Persisted index unusable, rebuilding"),
            }
        } else {
            info!(docs = %docs_dir.display(), fingerprint = short(&fingerprint), "Corpus changed or index missing, rebuilding");
        }

        let index = Arc::new(self.build(docs_dir, index_dir, &fingerprint, embedder).await?);
        self.index_cache.insert(key, fingerprint.clone(), Arc::clone(&index));
        Ok(LoadedIndex { index, origin: IndexOrigin::Built, fingerprint })
    }

    /// Rebuild regardless of the stored fingerprint.
    pub async fn rebuild(&self, docs_dir: &Path, index_dir: &Path) -> Result<LoadedIndex> {
        ensure_corpus(docs_dir)?;
        let key = (docs_dir.to_path_buf(), index_dir.to_path_buf());
        let lock = self.index_cache.build_lock(&key);
        let _guard = lock.lock().await;
        let fingerprint = compute_fingerprint(docs_dir)?;
        let embedder = self.embedder()?;
        let index = Arc::new(self.build(docs_dir, index_dir, &fingerprint, embedder).await?);
        self.index_cache.insert(key, fingerprint.clone(), Arc::clone(&index));
        Ok(LoadedIndex { index, origin: IndexOrigin::Built, fingerprint })
    }

    async fn build(
        &self,
        docs_dir: &Path,
        index_dir: &Path,
        fingerprint: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<SemanticIndex> {
        let processor = DataProcessor::with_config(self.chunking.clone());
        let chunks = processor.process_directory(docs_dir).map_err(|e| Error::Ingestion(format!("{e:#}")))?;
        if chunks.is_empty() {
            return Err(Error::Ingestion(format!("no text could be extracted from {}", docs_dir.display())));
        }

        let embeddings = embed_all(&embedder, &chunks).await?;
        // Removed on drop if anything below fails.
        let staging = staging_dir(index_dir)?;

        {
            let conn = open_db(&staging.path().to_string_lossy()).await.map_err(index_err)?;
            write_chunks(&conn, &chunks, &embeddings, embedder.dim()).await.map_err(index_err)?;
            if chunks.len() >= self.ann_threshold {
                let params = compute_ivfpq_params(chunks.len(), embedder.dim());
                build_ivfpq_index(&conn, &params).await.map_err(index_err)?;
            }
        }

        swap_into_place(staging.path(), index_dir)?;
        write_stored(index_dir, fingerprint)?;
        info!(index = %index_dir.display(), chunks = chunks.len(), fingerprint = short(fingerprint), "Index built");

        SemanticIndex::open(index_dir, embedder).await.map_err(index_err)
    }
}

/// Missing directory is created and reported; an empty one is reported too.
fn ensure_corpus(docs_dir: &Path) -> Result<()> {
    if !docs_dir.exists() {
        fs::create_dir_all(docs_dir)?;
        return Err(Error::CorpusMissing(docs_dir.to_path_buf()));
    }
    let files = list_source_files(docs_dir).map_err(|e| Error::Ingestion(format!("{e:#}")))?;
    if files.is_empty() {
        return Err(Error::CorpusEmpty(docs_dir.to_path_buf()));
    }
    Ok(())
}

async fn embed_all(embedder: &Arc<dyn Embedder>, chunks: &[DocumentChunk]) -> Result<Vec<Vec<f32>>> {
    let pb = embed_progress(chunks.len());
    let mut out = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(EMBED_BATCH) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let embedder = Arc::clone(embedder);
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
            .await
            .map_err(|e| Error::Model(e.to_string()))?
            .map_err(|e| Error::Model(format!("{e:#}")))?;
        out.extend(vectors);
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();
    Ok(out)
}

/// Fresh sibling of `index_dir`, unique per build.
fn staging_dir(index_dir: &Path) -> Result<tempfile::TempDir> {
    let name = index_dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "index".into());
    let parent = index_dir.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    Ok(tempfile::Builder::new().prefix(&format!("{name}.staging-")).tempdir_in(parent)?)
}

/// Replace `index_dir` with `staging`. The old directory (and its fingerprint)
/// is moved aside first and removed only after the new one is in place.
fn swap_into_place(staging: &Path, index_dir: &Path) -> Result<()> {
    let mut retired = staging.as_os_str().to_owned();
    retired.push(".retired");
    let retired = PathBuf::from(retired);
    if index_dir.exists() {
        fs::rename(index_dir, &retired)?;
    }
    fs::rename(staging, index_dir)?;
    if retired.exists() {
        fs::remove_dir_all(&retired)?;
    }
    Ok(())
}

fn index_err(e: anyhow::Error) -> Error {
    Error::Index(format!("{e:#}"))
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}
