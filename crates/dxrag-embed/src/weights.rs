use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Fields read from `config.json` on top of what candle's BERT config parses.
#[derive(Debug, Deserialize)]
pub struct ModelShape {
    pub hidden_size: usize,
}

pub fn read_config<T: serde::de::DeserializeOwned>(model_dir: &Path) -> Result<T> {
    let path = model_dir.join("config.json");
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Prefer `model.safetensors`, fall back to `pytorch_model.bin`.
pub fn load_var_builder(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    let pickle = model_dir.join("pytorch_model.bin");
    let tensors: HashMap<String, Tensor> = if safetensors.exists() {
        candle_core::safetensors::load(&safetensors, device)?
    } else if pickle.exists() {
        candle_core::pickle::read_all(&pickle)?.into_iter().collect()
    } else {
        return Err(anyhow!("no model weights under {}", model_dir.display()));
    };
    Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
}
