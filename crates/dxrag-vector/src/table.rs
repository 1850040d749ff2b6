//! LanceDB connection and chunk-table I/O.

use anyhow::{anyhow, Result};
use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection};
use std::sync::Arc;
use tracing::info;

use dxrag_core::types::{ChunkMeta, DocumentChunk};

use crate::schema::{build_chunks_schema, CHUNKS_TABLE};

const WRITE_BATCH: usize = 1000;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn has_chunks_table(conn: &Connection) -> Result<bool> {
    Ok(conn.table_names().execute().await?.iter().any(|n| n == CHUNKS_TABLE))
}

/// Create the chunk table from scratch. `embeddings[i]` belongs to `chunks[i]`.
pub async fn write_chunks(conn: &Connection, chunks: &[DocumentChunk], embeddings: &[Vec<f32>], dim: usize) -> Result<()> {
    if chunks.len() != embeddings.len() {
        return Err(anyhow!("{} chunks but {} embeddings", chunks.len(), embeddings.len()));
    }
    let dim_i32 = i32::try_from(dim)?;
    let schema = build_chunks_schema(dim_i32);
    let mut batches = Vec::new();
    for (chunk_slice, emb_slice) in chunks.chunks(WRITE_BATCH).zip(embeddings.chunks(WRITE_BATCH)) {
        batches.push(Ok(to_record_batch(chunk_slice, emb_slice, dim_i32)?));
    }
    let reader = Box::new(RecordBatchIterator::new(batches.into_iter(), schema));
    conn.create_table(CHUNKS_TABLE, reader).execute().await?;
    info!(rows = chunks.len(), dim, "Wrote chunk table");
    Ok(())
}

fn to_record_batch(chunks: &[DocumentChunk], embeddings: &[Vec<f32>], dim: i32) -> Result<RecordBatch> {
    let mut ids = Vec::with_capacity(chunks.len());
    let mut sources = Vec::with_capacity(chunks.len());
    let mut pages = Vec::with_capacity(chunks.len());
    let mut indices = Vec::with_capacity(chunks.len());
    let mut contents = Vec::with_capacity(chunks.len());
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(chunks.len());
    for (chunk, emb) in chunks.iter().zip(embeddings) {
        if emb.len() != dim as usize {
            return Err(anyhow!("embedding for chunk {} has {} dims, expected {}", chunk.chunk_index, emb.len(), dim));
        }
        ids.push(chunk.id.clone());
        sources.push(chunk.metadata.source_name.clone());
        pages.push(i32::try_from(chunk.metadata.page_number)?);
        indices.push(i32::try_from(chunk.chunk_index)?);
        contents.push(chunk.content.clone());
        vectors.push(Some(emb.iter().copied().map(Some).collect()));
    }
    Ok(RecordBatch::try_new(
        build_chunks_schema(dim),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(sources)),
            Arc::new(Int32Array::from(pages)),
            Arc::new(Int32Array::from(indices)),
            Arc::new(StringArray::from(contents)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
        ],
    )?)
}

/// Every stored chunk (without vectors), ordered by `chunk_index`.
pub async fn read_chunks(conn: &Connection) -> Result<Vec<DocumentChunk>> {
    let table = conn.open_table(CHUNKS_TABLE).execute().await?;
    let rows = table.count_rows(None).await?;
    if rows == 0 {
        return Ok(Vec::new());
    }
    let mut stream = table
        .query()
        .select(Select::columns(&["id", "source", "page", "chunk_index", "content"]))
        .limit(rows)
        .execute()
        .await?;

    let mut chunks = Vec::with_capacity(rows);
    while let Some(batch) = stream.try_next().await? {
        let ids = string_col(&batch, "id")?;
        let sources = string_col(&batch, "source")?;
        let contents = string_col(&batch, "content")?;
        let pages = int_col(&batch, "page")?;
        let indices = int_col(&batch, "chunk_index")?;
        for i in 0..batch.num_rows() {
            chunks.push(DocumentChunk {
                id: ids.value(i).to_string(),
                content: contents.value(i).to_string(),
                metadata: ChunkMeta {
                    source_name: sources.value(i).to_string(),
                    page_number: u32::try_from(pages.value(i))?,
                },
                chunk_index: usize::try_from(indices.value(i))?,
            });
        }
    }
    chunks.sort_by_key(|c| c.chunk_index);
    Ok(chunks)
}

pub(crate) fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("{name} column missing"))
}

fn int_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow!("{name} column missing"))
}

pub(crate) fn embed_progress(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
