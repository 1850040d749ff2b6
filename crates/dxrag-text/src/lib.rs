//! dxrag-text
//!
//! In-memory BM25 lexical index over document chunks.

pub mod bm25;
pub mod tokenize;

pub use bm25::{Bm25Index, Bm25Params};
pub use tokenize::tokenize;
