//! Candidate re-ranking.
//!
//! The mode is fixed when the [`Reranker`] is built: either a learned pair
//! scorer or keyword overlap. A scorer failure is an error, never a silent
//! switch to keywords.

use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tracing::debug;

use dxrag_core::error::{Error, Result};
use dxrag_core::traits::PairScorer;
use dxrag_core::types::DocumentChunk;

#[derive(Clone)]
pub enum RerankMode {
    CrossEncoder(Arc<dyn PairScorer>),
    Keyword,
}

#[derive(Debug, Clone)]
pub struct RankedChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

#[derive(Clone)]
pub struct Reranker {
    mode: RerankMode,
    passage_chars: usize,
}

impl Reranker {
    /// Learned mode when `scorer` is present, keyword mode otherwise.
    pub fn new(scorer: Option<Arc<dyn PairScorer>>, passage_chars: usize) -> Self {
        let mode = scorer.map_or(RerankMode::Keyword, RerankMode::CrossEncoder);
        Self { mode, passage_chars }
    }

    pub fn keyword() -> Self {
        Self { mode: RerankMode::Keyword, passage_chars: 0 }
    }

    pub fn is_learned(&self) -> bool {
        matches!(self.mode, RerankMode::CrossEncoder(_))
    }

    pub fn label(&self) -> &'static str {
        match self.mode {
            RerankMode::CrossEncoder(_) => "CrossEncoderRerank",
            RerankMode::Keyword => "KeywordRerank",
        }
    }

    /// Score every candidate, stable-sort descending and keep `top_k`.
    pub fn rerank(&self, query: &str, candidates: Vec<DocumentChunk>, top_k: usize) -> Result<Vec<RankedChunk>> {
        if candidates.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let scores = match &self.mode {
            RerankMode::CrossEncoder(scorer) => {
                let passages: Vec<String> =
                    candidates.iter().map(|c| c.content.chars().take(self.passage_chars).collect()).collect();
                let scores = scorer
                    .score_pairs(query, &passages)
                    .map_err(|e| Error::Rerank(format!("{}: {e:#}", scorer.name())))?;
                if scores.len() != candidates.len() {
                    return Err(Error::Rerank(format!(
                        "{} returned {} scores for {} candidates",
                        scorer.name(),
                        scores.len(),
                        candidates.len()
                    )));
                }
                scores
            }
            RerankMode::Keyword => {
                let query_terms = word_set(query);
                candidates
                    .iter()
                    .map(|c| word_set(&c.content).intersection(&query_terms).count() as f32)
                    .collect()
            }
        };

        let mut ranked: Vec<RankedChunk> =
            candidates.into_iter().zip(scores).map(|(chunk, score)| RankedChunk { chunk, score }).collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(top_k);
        debug!(mode = self.label(), kept = ranked.len(), "Reranked candidates");
        Ok(ranked)
    }
}

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").unwrap_or_else(|e| unreachable!("static pattern: {e}")))
}

/// Distinct lowercase word-character runs.
fn word_set(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    word_regex().find_iter(&lowered).map(|m| m.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxrag_core::types::ChunkMeta;

    struct LengthScorer;

    impl PairScorer for LengthScorer {
        fn name(&self) -> &str {
            "length"
        }

        fn score_pairs(&self, _query: &str, passages: &[String]) -> anyhow::Result<Vec<f32>> {
            Ok(passages.iter().map(|p| p.chars().count() as f32).collect())
        }
    }

    struct BrokenScorer;

    impl PairScorer for BrokenScorer {
        fn name(&self) -> &str {
            "broken"
        }

        fn score_pairs(&self, _query: &str, _passages: &[String]) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("device lost")
        }
    }

    fn chunk(text: &str) -> DocumentChunk {
        DocumentChunk::new(text, ChunkMeta { source_name: "x.txt".into(), page_number: 1 }, 0)
    }

    #[test]
    fn keyword_mode_counts_distinct_overlap() {
        let out = Reranker::keyword()
            .rerank("fever fever cough", vec![chunk("rash"), chunk("Fever with cough"), chunk("fever fever fever")], 3)
            .unwrap();
        let texts: Vec<_> = out.iter().map(|r| r.chunk.content.as_str()).collect();
        assert_eq!(texts, vec!["Fever with cough", "fever fever fever", "rash"]);
        assert_eq!(out[0].score, 2.0);
        assert_eq!(out[1].score, 1.0);
    }

    #[test]
    fn keyword_ties_keep_input_order() {
        let out = Reranker::keyword().rerank("x", vec![chunk("a"), chunk("b"), chunk("c")], 2).unwrap();
        let texts: Vec<_> = out.iter().map(|r| r.chunk.content.as_str()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn learned_mode_truncates_passages() {
        let reranker = Reranker::new(Some(Arc::new(LengthScorer)), 5);
        assert!(reranker.is_learned());
        let out = reranker.rerank("q", vec![chunk("abc"), chunk("abcdefghij"), chunk("abcd")], 3).unwrap();
        assert_eq!(out[0].chunk.content, "abcdefghij");
        assert_eq!(out[0].score, 5.0, "scored on the first five characters only");
        assert_eq!(out[1].chunk.content, "abcd");
    }

    #[test]
    fn learned_failure_is_not_masked() {
        let reranker = Reranker::new(Some(Arc::new(BrokenScorer)), 500);
        let err = reranker.rerank("q", vec![chunk("a")], 1).unwrap_err();
        assert!(matches!(err, Error::Rerank(_)));
    }
}
