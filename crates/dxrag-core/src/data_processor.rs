//! Corpus loading and chunking.
//!
//! Only the top level of the corpus directory is read. PDFs yield one
//! [`SourceDocument`] per page; `.txt`/`.md` files yield a single page-1 document.

use anyhow::Context;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::{ChunkMeta, DocumentChunk, SourceDocument};

/// Boundary markers tried in order: section headers, paragraph, line, sentence, word.
pub const SEPARATORS: &[&str] = &["\n## ", "\n### ", "\n#### ", "\n\n", "\n", ". ", " "];

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Upper bound on chunk length, in characters.
    pub chunk_size: usize,
    /// Characters carried over between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 1200, chunk_overlap: 200 }
    }
}

#[derive(Default)]
pub struct DataProcessor {
    chunking_config: ChunkingConfig,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_config(chunking_config: ChunkingConfig) -> Self { Self { chunking_config } }

    /// Load and split every supported file under `data_dir`.
    pub fn process_directory(&self, data_dir: &Path) -> anyhow::Result<Vec<DocumentChunk>> {
        let documents = self.load_documents(data_dir)?;
        let chunks = self.split_documents(&documents);
        info!(documents = documents.len(), chunks = chunks.len(), "Processed corpus");
        Ok(chunks)
    }

    /// Extract text from every supported file. A file that fails to parse is
    /// logged and skipped so one corrupt PDF does not sink the whole build.
    pub fn load_documents(&self, data_dir: &Path) -> anyhow::Result<Vec<SourceDocument>> {
        let files = list_source_files(data_dir)?;
        let mut documents = Vec::new();
        for (file_index, file_path) in files.iter().enumerate() {
            let Some(kind) = SourceFormat::from_path(file_path) else { continue };
            debug!(file = %file_path.display(), n = file_index + 1, total = files.len(), "Loading source file");
            let loaded = match kind {
                SourceFormat::Pdf => load_pdf(file_path),
                SourceFormat::Text => load_text(file_path),
            };
            match loaded {
                Ok(docs) => documents.extend(docs),
                Err(e) => warn!(file = %file_path.display(), error = %e, "Skipping unreadable source file"),
            }
        }
        Ok(documents)
    }

    pub fn split_documents(&self, documents: &[SourceDocument]) -> Vec<DocumentChunk> {
        let mut chunks = Vec::new();
        for doc in documents {
            for piece in self.split_text(&doc.text) {
                let index = chunks.len();
                chunks.push(DocumentChunk::new(piece, doc.meta.clone(), index));
            }
        }
        chunks
    }

    /// Recursively split `text` on [`SEPARATORS`], then merge neighbouring pieces
    /// back up to `chunk_size` with `chunk_overlap` characters of carry-over.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let position = separators.iter().position(|s| text.contains(s));
        let (separator, rest) = match position {
            Some(i) => (separators[i], &separators[i + 1..]),
            None => ("", &[][..]),
        };

        let mut out = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunking_config.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                out.extend(self.merge_pieces(&pending));
                pending.clear();
            }
            if separator.is_empty() {
                out.push(piece);
            } else {
                out.extend(self.split_recursive(&piece, rest));
            }
        }
        if !pending.is_empty() {
            out.extend(self.merge_pieces(&pending));
        }
        out
    }

    fn merge_pieces(&self, pieces: &[String]) -> Vec<String> {
        let size = self.chunking_config.chunk_size;
        let overlap = self.chunking_config.chunk_overlap;
        let mut out = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > size && !window.is_empty() {
                push_trimmed(&mut out, &window);
                while total > overlap || (total + len > size && total > 0) {
                    let Some(front) = window.pop_front() else { break };
                    total -= char_len(front);
                }
            }
            window.push_back(piece);
            total += len;
        }
        push_trimmed(&mut out, &window);
        out
    }
}

#[derive(Debug, Clone, Copy)]
enum SourceFormat {
    Pdf,
    Text,
}

impl SourceFormat {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "md" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Regular files directly under `root`, sorted by file name.
pub fn list_source_files(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("reading {}", root.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn source_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn load_text(path: &Path) -> anyhow::Result<Vec<SourceDocument>> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    Ok(vec![SourceDocument { text, meta: ChunkMeta { source_name: source_name(path), page_number: 1 } }])
}

fn load_pdf(path: &Path) -> anyhow::Result<Vec<SourceDocument>> {
    let doc = lopdf::Document::load(path).with_context(|| format!("loading PDF {}", path.display()))?;
    let name = source_name(path);
    let mut pages = Vec::new();
    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(text) if !text.trim().is_empty() => pages.push(SourceDocument {
                text,
                meta: ChunkMeta { source_name: name.clone(), page_number: *page_number },
            }),
            Ok(_) => {}
            Err(e) => warn!(file = %name, page = page_number, error = %e, "Failed to extract page text, skipping"),
        }
    }
    Ok(pages)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_trimmed(out: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Split on `separator`, keeping it at the start of the following piece.
/// An empty separator splits into single characters.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(text[start..idx].to_string());
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(text[start..].to_string());
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(size: usize, overlap: usize) -> DataProcessor {
        DataProcessor::with_config(ChunkingConfig { chunk_size: size, chunk_overlap: overlap })
    }

    #[test]
    fn separator_stays_with_following_piece() {
        let pieces = split_keeping_separator("a\n\nb\n\nc", "\n\n");
        assert_eq!(pieces, vec!["a", "\n\nb", "\n\nc"]);
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = processor(100, 10).split_text("Community-acquired pneumonia.\n\nTreat early.");
        assert_eq!(chunks, vec!["Community-acquired pneumonia.\n\nTreat early."]);
    }

    #[test]
    fn chunks_respect_size_bound() {
        let text = (0..200).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        for chunk in processor(60, 15).split_text(&text) {
            assert!(chunk.chars().count() <= 60, "chunk too long: {chunk:?}");
        }
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = (0..40).map(|i| format!("w{i:02}")).collect::<Vec<_>>().join(" ");
        let chunks = processor(40, 12).split_text(&text);
        assert!(chunks.len() > 1);
        let last_word = chunks[0].split_whitespace().last().unwrap();
        assert!(chunks[1].contains(last_word), "expected carry-over of {last_word}");
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let para_a = "a".repeat(30);
        let para_b = "b".repeat(30);
        let chunks = processor(40, 0).split_text(&format!("{para_a}\n\n{para_b}"));
        assert_eq!(chunks, vec![para_a, para_b]);
    }
}
