//! Query side of the persisted chunk table.

use anyhow::anyhow;
use arrow_array::Float32Array;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use dxrag_core::error::{Error, Result};
use dxrag_core::traits::{Embedder, SemanticSearch};
use dxrag_core::types::{DocumentChunk, SearchHit, SourceKind};

use crate::schema::{vector_dim, CHUNKS_TABLE};
use crate::table::{has_chunks_table, open_db, read_chunks, string_col};

/// A ready-to-query vector index: the LanceDB table plus every chunk in memory.
pub struct SemanticIndex {
    path: PathBuf,
    table: Table,
    chunks: Vec<DocumentChunk>,
    by_id: HashMap<String, usize>,
    embedder: Arc<dyn Embedder>,
}

impl SemanticIndex {
    /// Open an existing index. Fails if the stored vectors do not match the
    /// embedder's dimension.
    pub async fn open(path: &Path, embedder: Arc<dyn Embedder>) -> anyhow::Result<Self> {
        let conn: Connection = open_db(&path.to_string_lossy()).await?;
        if !has_chunks_table(&conn).await? {
            return Err(anyhow!("no {CHUNKS_TABLE} table in {}", path.display()));
        }
        let table = conn.open_table(CHUNKS_TABLE).execute().await?;
        let schema = table.schema().await?;
        let stored_dim = vector_dim(&schema).ok_or_else(|| anyhow!("chunk table has no vector column"))?;
        if stored_dim != embedder.dim() {
            return Err(anyhow!("index has {}-d vectors, embedder produces {}-d", stored_dim, embedder.dim()));
        }
        let chunks = read_chunks(&conn).await?;
        let by_id = chunks.iter().enumerate().map(|(i, c)| (c.id.clone(), i)).collect();
        Ok(Self { path: path.to_path_buf(), table, chunks, by_id, embedder })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let text = vec![query.to_string()];
        let mut out = tokio::task::spawn_blocking(move || embedder.embed_batch(&text))
            .await
            .map_err(|e| Error::Model(e.to_string()))?
            .map_err(|e| Error::Model(e.to_string()))?;
        out.pop().ok_or_else(|| Error::Model("embedder returned no vector".into()))
    }

    async fn nearest(&self, vector: Vec<f32>, k: usize) -> anyhow::Result<Vec<(String, f32)>> {
        let mut stream = self
            .table
            .vector_search(vector)?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await?;
        let mut out = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            let ids = string_col(&batch, "id")?;
            let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
            for i in 0..batch.num_rows() {
                let score = distances.map_or(0.0, |d| 1.0 - d.value(i));
                out.push((ids.value(i).to_string(), score));
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl SemanticSearch for SemanticIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 || self.chunks.is_empty() {
            return Ok(Vec::new());
        }
        let vector = self.embed_query(query).await?;
        let nearest = self.nearest(vector, k).await.map_err(|e| Error::Index(e.to_string()))?;
        let hits: Vec<SearchHit> = nearest
            .into_iter()
            .filter_map(|(id, score)| {
                let chunk = self.chunks.get(*self.by_id.get(&id)?)?;
                Some(SearchHit { chunk: chunk.clone(), score, source: SourceKind::Vector })
            })
            .collect();
        debug!(k, hits = hits.len(), "Semantic search");
        Ok(hits)
    }

    fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }
}
