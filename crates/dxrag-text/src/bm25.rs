use std::collections::HashMap;

use dxrag_core::types::{DocumentChunk, SearchHit, SourceKind};
use tracing::debug;

use crate::tokenize::tokenize;

#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f32,
    /// Length normalization.
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Okapi BM25 over an immutable chunk collection.
///
/// Built once; a changed collection means building a new index.
pub struct Bm25Index {
    chunks: Vec<DocumentChunk>,
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<usize>,
    avg_doc_len: f32,
    idf: HashMap<String, f32>,
    params: Bm25Params,
}

impl Bm25Index {
    pub fn build(chunks: Vec<DocumentChunk>, params: Bm25Params) -> Self {
        let mut term_freqs = Vec::with_capacity(chunks.len());
        let mut doc_lens = Vec::with_capacity(chunks.len());
        let mut doc_freq: HashMap<String, u32> = HashMap::new();

        for chunk in &chunks {
            let tokens = tokenize(&chunk.content);
            doc_lens.push(tokens.len());
            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *tf.entry(token).or_default() += 1;
            }
            for token in tf.keys() {
                *doc_freq.entry(token.clone()).or_default() += 1;
            }
            term_freqs.push(tf);
        }

        let n = chunks.len() as f32;
        let avg_doc_len = if chunks.is_empty() { 0.0 } else { doc_lens.iter().sum::<usize>() as f32 / n };
        let idf = doc_freq
            .into_iter()
            .map(|(token, df)| {
                let df = df as f32;
                (token, ((n - df + 0.5) / (df + 0.5) + 1.0).ln())
            })
            .collect::<HashMap<_, _>>();

        debug!(chunks = chunks.len(), vocabulary = idf.len(), avg_doc_len, "Built BM25 index");
        Self { chunks, term_freqs, doc_lens, avg_doc_len, idf, params }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    /// Score of chunk `doc` for pre-tokenized query terms. Repeated query
    /// terms contribute once per occurrence.
    pub fn score(&self, query_tokens: &[String], doc: usize) -> f32 {
        let Bm25Params { k1, b } = self.params;
        let tf_map = &self.term_freqs[doc];
        let len_ratio = if self.avg_doc_len > 0.0 { self.doc_lens[doc] as f32 / self.avg_doc_len } else { 0.0 };

        query_tokens
            .iter()
            .filter_map(|token| {
                let idf = self.idf.get(token)?;
                let tf = *tf_map.get(token)? as f32;
                Some(idf * tf * (k1 + 1.0) / (tf + k1 * (1.0 - b + b * len_ratio)))
            })
            .sum()
    }

    /// Top `top_k` chunks by descending score. Zero-score chunks are never
    /// returned; ties keep collection order.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = (0..self.chunks.len())
            .map(|i| (i, self.score(&query_tokens, i)))
            .filter(|(_, s)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);
        scored
            .into_iter()
            .map(|(i, score)| SearchHit { chunk: self.chunks[i].clone(), score, source: SourceKind::Text })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxrag_core::types::ChunkMeta;

    fn chunk(text: &str, i: usize) -> DocumentChunk {
        DocumentChunk::new(text, ChunkMeta { source_name: "t.txt".into(), page_number: 1 }, i)
    }

    #[test]
    fn idf_is_positive_even_for_ubiquitous_terms() {
        let idx = Bm25Index::build(vec![chunk("fever", 0), chunk("fever", 1)], Bm25Params::default());
        assert!(idx.idf["fever"] > 0.0);
    }

    #[test]
    fn repeated_query_terms_count_per_occurrence() {
        let idx = Bm25Index::build(vec![chunk("fever cough", 0), chunk("rash", 1)], Bm25Params::default());
        let once = idx.score(&["fever".to_string()], 0);
        let twice = idx.score(&["fever".to_string(), "fever".to_string()], 0);
        assert!((twice - 2.0 * once).abs() < 1e-6);
    }
}
