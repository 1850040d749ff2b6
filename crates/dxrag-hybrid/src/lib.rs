//! dxrag-hybrid
//!
//! Query expansion, semantic + BM25 candidate pooling, reranking and context
//! assembly.

pub mod expand;
pub mod rerank;
pub mod retriever;

pub use expand::expand;
pub use rerank::{RankedChunk, RerankMode, Reranker};
pub use retriever::{render_context, HybridRetriever, RetrievalParams, VariantOutcome, CONTEXT_SEPARATOR, NO_DOCUMENTS_SENTINEL};
