use std::sync::Arc;

use dxrag_core::config::ModelSettings;
use dxrag_core::traits::{Embedder, PairScorer};
use dxrag_embed::{get_cross_encoder, get_default_embedder, resolve_model_dir, FakeEmbedder, ModelCache, FAKE_DIM};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
fn fake_embedder_shapes_and_determinism() {
    let embedder = FakeEmbedder::new(FAKE_DIM);
    let texts = vec!["fever and cough".to_string(), "fever and cough".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), FAKE_DIM);

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[test]
fn fake_embedder_ranks_shared_words_closer() {
    let embedder = FakeEmbedder::new(FAKE_DIM);
    let embs = embedder
        .embed_batch(&["chest pain".to_string(), "Chest pain on exertion".to_string(), "itchy rash".to_string()])
        .unwrap();
    assert!(cosine(&embs[0], &embs[1]) > cosine(&embs[0], &embs[2]));
}

#[test]
fn cache_returns_the_same_instance() {
    let cache = ModelCache::new();
    let first = cache
        .embedder_or_load("m", || {
            let e: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(8));
            Ok(e)
        })
        .unwrap();
    let second = cache.embedder_or_load("m", || panic!("must not reload")).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.loaded_models(), vec!["m".to_string()]);
}

#[test]
fn cached_fake_short_circuits_model_loading() {
    let cache = ModelCache::new();
    let settings = ModelSettings { embedding: "injected".into(), ..ModelSettings::default() };
    let fake: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(16));
    cache.insert_embedder("injected", Arc::clone(&fake));
    let got = get_default_embedder(&settings, &cache).unwrap();
    assert_eq!(got.dim(), 16);
}

#[test]
fn missing_cross_encoder_degrades_to_none() {
    let tmp = tempfile::TempDir::new().unwrap();
    let settings = ModelSettings { dir: tmp.path().to_path_buf(), ..ModelSettings::default() };
    assert!(get_cross_encoder(&settings, &ModelCache::new()).is_none());

    let disabled = ModelSettings { use_cross_encoder: false, ..settings };
    assert!(get_cross_encoder(&disabled, &ModelCache::new()).is_none());
}

struct ConstScorer;

impl PairScorer for ConstScorer {
    fn name(&self) -> &str {
        "const"
    }

    fn score_pairs(&self, _query: &str, passages: &[String]) -> anyhow::Result<Vec<f32>> {
        Ok(vec![1.0; passages.len()])
    }
}

#[test]
fn injected_scorer_is_served_from_cache() {
    let cache = ModelCache::new();
    cache.insert_scorer("cross-encoder/ms-marco-MiniLM-L-6-v2", Arc::new(ConstScorer));
    let scorer = get_cross_encoder(&ModelSettings::default(), &cache).expect("cached scorer");
    assert_eq!(scorer.name(), "const");
    assert_eq!(scorer.score_pairs("q", &["a".into(), "b".into()]).unwrap(), vec![1.0, 1.0]);
}

#[test]
fn model_dir_resolves_short_name() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = tmp.path().join("ms-marco-MiniLM-L-6-v2");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.json"), "{}").unwrap();
    let found = resolve_model_dir(tmp.path(), "cross-encoder/ms-marco-MiniLM-L-6-v2").unwrap();
    assert_eq!(found, dir);
}
