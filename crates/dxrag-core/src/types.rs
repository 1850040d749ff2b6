//! Domain types shared by the lexical, semantic and reasoning layers.

use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// Hex BLAKE3 digest of a chunk's text; used as the chunk identity.
pub fn content_hash(text: &str) -> ChunkId {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Where a chunk came from.
///
/// - `source_name`: file name of the source document (no directory)
/// - `page_number`: 1-based page; plain-text sources are always page 1
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub source_name: String,
    pub page_number: u32,
}

/// A page (or whole file) of extracted text before splitting.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub text: String,
    pub meta: ChunkMeta,
}

/// A chunk of a source document that is independently indexed.
///
/// - `id`: content hash of `content`; two chunks with equal text are the same chunk
/// - `content`: the text payload of the chunk
/// - `metadata`: source attribution
/// - `chunk_index`: position within the whole collection at build time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: ChunkId,
    pub content: String,
    pub metadata: ChunkMeta,
    pub chunk_index: usize,
}

impl DocumentChunk {
    pub fn new(content: impl Into<String>, metadata: ChunkMeta, chunk_index: usize) -> Self {
        let content = content.into();
        Self { id: content_hash(&content), content, metadata, chunk_index }
    }
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Text,
}

/// The minimal surface returned by both engines.
///
/// `score` is engine-specific but higher is always better.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: DocumentChunk,
    pub score: f32,
    pub source: SourceKind,
}

/// One web search result as handed to the reasoning prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub snippet: String,
}
