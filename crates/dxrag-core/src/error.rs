use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Document directory {} did not exist; it has been created, add reference documents and retry", .0.display())]
    CorpusMissing(PathBuf),

    #[error("Document directory {} is empty; add reference documents and retry", .0.display())]
    CorpusEmpty(PathBuf),

    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    #[error("Index operation failed: {0}")]
    Index(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Rerank failed: {0}")]
    Rerank(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Web search failed: {0}")]
    WebSearch(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the "corpus needs population" family of failures.
    pub fn is_corpus_unavailable(&self) -> bool {
        matches!(self, Self::CorpusMissing(_) | Self::CorpusEmpty(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
