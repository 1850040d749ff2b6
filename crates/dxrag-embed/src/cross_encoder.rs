//! BERT cross-encoder scoring (query, passage) pairs jointly.
//!
//! Head layout follows the sequence-classification checkpoints published for
//! MS MARCO: `bert.*` encoder, `bert.pooler.dense` with tanh, then a single-logit
//! `classifier`. The raw logit is the relevance score.

use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use candle_nn::{Linear, Module};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use dxrag_core::traits::PairScorer;

use crate::device::select_device;
use crate::tokenize::{encode_on_device, load_tokenizer};
use crate::weights::{load_var_builder, read_config, ModelShape};

const PAIR_BATCH: usize = 16;

pub struct CrossEncoder {
    name: String,
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
}

impl CrossEncoder {
    pub fn load(model_dir: &Path, name: &str, max_len: usize) -> Result<Self> {
        let device = select_device();
        info!(model = name, dir = %model_dir.display(), "Loading cross-encoder");
        let tokenizer = load_tokenizer(model_dir, max_len)?;
        let config: BertConfig = read_config(model_dir)?;
        let shape: ModelShape = read_config(model_dir)?;
        let vb = load_var_builder(model_dir, &device)?;

        let bert = BertModel::load(vb.clone(), &config)?;
        let pooler = candle_nn::linear(shape.hidden_size, shape.hidden_size, vb.pp("bert.pooler.dense"))?;
        let classifier = candle_nn::linear(shape.hidden_size, 1, vb.pp("classifier"))?;
        Ok(Self { name: name.to_string(), bert, pooler, classifier, tokenizer, device })
    }

    fn score_batch(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let pairs: Vec<(&str, &str)> = passages.iter().map(|p| (query, p.as_str())).collect();
        let batch = encode_on_device(&self.tokenizer, pairs, &self.device)?;
        let hidden = self.bert.forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
        let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits: Tensor = self.classifier.forward(&pooled)?.squeeze(1)?;
        Ok(logits.to_device(&Device::Cpu)?.to_vec1::<f32>()?)
    }
}

impl PairScorer for CrossEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn score_pairs(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(passages.len());
        for chunk in passages.chunks(PAIR_BATCH) {
            scores.extend(self.score_batch(query, chunk)?);
        }
        if scores.len() != passages.len() {
            return Err(anyhow!("scored {} of {} passages", scores.len(), passages.len()));
        }
        debug!(model = %self.name, pairs = scores.len(), "Scored pairs");
        Ok(scores)
    }
}
