//! dxrag-vector
//!
//! LanceDB-backed semantic index over document chunks, persisted next to a
//! corpus fingerprint and rebuilt whenever the corpus changes.

pub mod fingerprint;
pub mod index;
pub mod index_build;
pub mod manager;
pub mod schema;
pub mod table;

pub use index::SemanticIndex;
pub use manager::{IndexCache, IndexManager, IndexOrigin, LoadedIndex};
