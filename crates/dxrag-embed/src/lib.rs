//! dxrag-embed
//!
//! Sentence embeddings and cross-encoder scoring on candle. Models are read
//! from local Hugging Face style directories (`config.json`, `tokenizer.json`,
//! weights) and shared through [`cache::ModelCache`].

pub mod cache;
pub mod cross_encoder;
pub mod device;
pub mod pool;
pub mod tokenize;
mod weights;

use anyhow::{anyhow, Result};
use candle_core::Device;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};
use twox_hash::XxHash64;

use dxrag_core::config::ModelSettings;
use dxrag_core::traits::{Embedder, PairScorer};

pub use cache::ModelCache;
pub use cross_encoder::CrossEncoder;
pub use pool::{l2_normalize, masked_mean_l2};

use crate::device::select_device;
use crate::tokenize::{encode_on_device, load_tokenizer};
use crate::weights::{load_var_builder, read_config, ModelShape};

/// Sentence-transformers models are trained at this length.
pub const EMBED_MAX_LEN: usize = 256;
const EMBED_BATCH: usize = 32;
/// Dimension of the hashed development embedder; matches MiniLM.
pub const FAKE_DIM: usize = 384;

/// BERT-family sentence encoder with mean pooling and L2 normalization.
pub struct EmbeddingModel {
    name: String,
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
}

impl EmbeddingModel {
    pub fn load(model_dir: &Path, name: &str, max_len: usize) -> Result<Self> {
        let device = select_device();
        let start = Instant::now();
        info!(model = name, dir = %model_dir.display(), "Loading embedding model");
        let tokenizer = load_tokenizer(model_dir, max_len)?;
        let config: BertConfig = read_config(model_dir)?;
        let shape: ModelShape = read_config(model_dir)?;
        let vb = load_var_builder(model_dir, &device)?;
        let model = BertModel::load(vb, &config)?;
        info!(model = name, dim = shape.hidden_size, elapsed_ms = start.elapsed().as_millis() as u64, "Embedding model ready");
        Ok(Self { name: name.to_string(), model, tokenizer, device, dim: shape.hidden_size, max_len })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let batch = encode_on_device(&self.tokenizer, inputs, &self.device)?;
        let hidden = self.model.forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        Ok(pooled.to_device(&Device::Cpu)?.to_vec2::<f32>()?)
    }
}

impl Embedder for EmbeddingModel {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(EMBED_BATCH) {
            out.extend(self.embed_chunk(chunk)?);
        }
        debug!(texts = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "Embedded batch");
        Ok(out)
    }
}

/// Deterministic bag-of-hashed-words embedder for tests and development.
///
/// Texts sharing words land close together, which is enough to exercise the
/// retrieval path without model files.
pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = usize::try_from(h % self.dim as u64).unwrap_or_default();
            v[idx] += 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
        }
        l2_normalize(&mut v);
        v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        EMBED_MAX_LEN
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Embedder for `settings.embedding`, loaded once per `cache`.
pub fn get_default_embedder(settings: &ModelSettings, cache: &ModelCache) -> Result<Arc<dyn Embedder>> {
    if use_fake_embeddings() {
        return cache.embedder_or_load("fake", || {
            info!(dim = FAKE_DIM, "Using FakeEmbedder");
            let fake: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(FAKE_DIM));
            Ok(fake)
        });
    }
    cache.embedder_or_load(&settings.embedding, || {
        let dir = resolve_model_dir(&settings.dir, &settings.embedding)?;
        let model: Arc<dyn Embedder> = Arc::new(EmbeddingModel::load(&dir, &settings.embedding, EMBED_MAX_LEN)?);
        Ok(model)
    })
}

/// Cross-encoder for `settings.cross_encoder`, or `None` when disabled or not
/// loadable. The caller decides the rerank mode from this once.
pub fn get_cross_encoder(settings: &ModelSettings, cache: &ModelCache) -> Option<Arc<dyn PairScorer>> {
    if !settings.use_cross_encoder {
        return None;
    }
    let loaded = cache.scorer_or_load(&settings.cross_encoder, || {
        let dir = resolve_model_dir(&settings.dir, &settings.cross_encoder)?;
        let scorer: Arc<dyn PairScorer> = Arc::new(CrossEncoder::load(&dir, &settings.cross_encoder, settings.max_len)?);
        Ok(scorer)
    });
    match loaded {
        Ok(scorer) => Some(scorer),
        Err(e) => {
            warn!(model = %settings.cross_encoder, error = %e, "Cross-encoder unavailable, using keyword rerank");
            None
        }
    }
}

/// Locate a model directory for `name` (e.g. `cross-encoder/ms-marco-MiniLM-L-6-v2`).
///
/// Looks under `APP_MODEL_DIR` first, then `root`; each root is tried with the
/// full name and with its last path segment.
pub fn resolve_model_dir(root: &Path, name: &str) -> Result<PathBuf> {
    let short = name.rsplit('/').next().unwrap_or(name);
    let mut roots = Vec::new();
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") {
        roots.push(PathBuf::from(dir));
    }
    roots.push(root.to_path_buf());

    for base in &roots {
        for candidate in [base.join(name), base.join(short)] {
            if candidate.join("config.json").exists() {
                debug!(model = name, dir = %candidate.display(), "Resolved model directory");
                return Ok(candidate);
            }
        }
    }
    Err(anyhow!("Could not locate model '{}' under {}", name, root.display()))
}
