use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use std::path::Path;
use tokenizers::{EncodeInput, Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

/// Token tensors for one padded batch, all `[B, T]` u32.
pub struct EncodedBatch {
    pub input_ids: Tensor,
    pub token_type_ids: Tensor,
    pub attention_mask: Tensor,
}

/// Load `tokenizer.json` with batch-longest padding and truncation at `max_len`.
/// Pair inputs are truncated longest-first so both segments keep their separators.
pub fn load_tokenizer(model_dir: &Path, max_len: usize) -> Result<Tokenizer> {
    let path = model_dir.join("tokenizer.json");
    let mut tokenizer = Tokenizer::from_file(&path)
        .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", path.display(), e))?;
    tokenizer
        .with_truncation(Some(TruncationParams { max_length: max_len, ..Default::default() }))
        .map_err(|e| anyhow!("Invalid truncation settings: {}", e))?;
    tokenizer.with_padding(Some(PaddingParams { strategy: PaddingStrategy::BatchLongest, ..Default::default() }));
    Ok(tokenizer)
}

pub fn encode_on_device<'s, E>(tokenizer: &Tokenizer, inputs: Vec<E>, device: &Device) -> Result<EncodedBatch>
where
    E: Into<EncodeInput<'s>> + Send,
{
    let encodings = tokenizer.encode_batch(inputs, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    to_tensors(&encodings, device)
}

fn to_tensors(encodings: &[Encoding], device: &Device) -> Result<EncodedBatch> {
    let batch = encodings.len();
    let width = encodings.first().map_or(0, Encoding::len);
    let mut ids = Vec::with_capacity(batch * width);
    let mut types = Vec::with_capacity(batch * width);
    let mut mask = Vec::with_capacity(batch * width);
    for enc in encodings {
        if enc.len() != width {
            return Err(anyhow!("ragged batch: expected {} tokens, got {}", width, enc.len()));
        }
        ids.extend_from_slice(enc.get_ids());
        types.extend_from_slice(enc.get_type_ids());
        mask.extend_from_slice(enc.get_attention_mask());
    }
    Ok(EncodedBatch {
        input_ids: Tensor::from_vec(ids, (batch, width), device)?,
        token_type_ids: Tensor::from_vec(types, (batch, width), device)?,
        attention_mask: Tensor::from_vec(mask, (batch, width), device)?,
    })
}
