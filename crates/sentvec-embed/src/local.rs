//! In-process BERT encoder loaded from a Hugging Face style model directory.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use sentvec_core::{Embedder, PoolingLayers, PoolingStrategy, SentenceInput};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info, warn};

use crate::device::{select_device, DevicePreference};
use crate::pool::{l2_normalize, pool};
use crate::tokenize::tokenize_batch_on_device;

#[derive(Debug, Clone)]
pub struct LocalOptions {
    pub device: DevicePreference,
    pub pooling: PoolingStrategy,
    /// Only the final encoder layer is reachable in-process.
    pub layers: PoolingLayers,
    pub max_seq_len: usize,
    pub normalize: bool,
}

impl Default for LocalOptions {
    fn default() -> Self {
        Self {
            device: DevicePreference::Auto,
            pooling: PoolingStrategy::ReduceMean,
            layers: PoolingLayers::last(),
            max_seq_len: 512,
            normalize: false,
        }
    }
}

impl LocalOptions {
    pub fn validate(&self) -> Result<()> {
        if self.pooling == PoolingStrategy::None {
            bail!(sentvec_core::Error::InvalidConfig(
                "pooling strategy NONE is not supported by the local backend".into()
            ));
        }
        if !self.layers.is_last_layer_only() {
            bail!(sentvec_core::Error::InvalidConfig(format!(
                "local backend pools the last layer only (got pooling layers {})",
                self.layers
            )));
        }
        if self.max_seq_len == 0 {
            bail!(sentvec_core::Error::InvalidConfig("max_seq_len must be positive".into()));
        }
        Ok(())
    }
}

pub struct LocalBertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    options: LocalOptions,
    hidden_size: usize,
    name: String,
}

impl LocalBertEmbedder {
    pub fn load(model_dir: &Path, options: LocalOptions) -> Result<Self> {
        options.validate()?;
        if !model_dir.is_dir() {
            bail!("model directory {} does not exist", model_dir.display());
        }
        let device = select_device(options.device)?;

        let tokenizer_path = model_dir.join("tokenizer.json");
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        tokenizer
            .with_truncation(Some(TruncationParams { max_length: options.max_seq_len, ..Default::default() }))
            .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;

        let config_path = model_dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config: BertConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", config_path.display()))?;
        let hidden_size = serde_json::from_str::<serde_json::Value>(&raw)?
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DTYPE, &device);
        let model = BertModel::load(vb, &config).context("building BERT encoder")?;

        let name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "local-bert".to_string());
        info!(model = %name, hidden_size, pooling = %options.pooling, "local encoder loaded");
        Ok(Self { model, tokenizer, device, options, hidden_size, name })
    }
}

fn weights_file(model_dir: &Path) -> Result<PathBuf> {
    for candidate in ["model.safetensors", "pytorch_model.bin"] {
        let path = model_dir.join(candidate);
        if path.exists() { return Ok(path); }
    }
    Err(anyhow!("no model.safetensors or pytorch_model.bin in {}", model_dir.display()))
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let path = weights_file(model_dir)?;
    debug!(path = %path.display(), "loading weights");
    let tensors = if path.extension().is_some_and(|e| e == "safetensors") {
        candle_core::safetensors::load(&path, device)?
    } else {
        candle_core::pickle::read_all(&path)?.into_iter().collect()
    };
    Ok(tensors)
}

impl Embedder for LocalBertEmbedder {
    fn name(&self) -> &str { &self.name }

    fn dim(&self) -> Option<usize> {
        match self.options.pooling {
            PoolingStrategy::ReduceMeanMax => Some(self.hidden_size * 2),
            _ => Some(self.hidden_size),
        }
    }

    fn embed_batch(&self, inputs: &[SentenceInput]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let batch = tokenize_batch_on_device(&self.tokenizer, inputs, self.options.max_seq_len, &self.device)?;
        let hidden = self
            .model
            .forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
        let mut pooled = pool(&hidden, &batch.attention_mask, self.options.pooling)?;
        if self.options.normalize {
            pooled = l2_normalize(&pooled)?;
        }
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(candle_core::DType::F32)?.to_vec2()?;
        if start.elapsed().as_millis() > 2_000 {
            warn!(elapsed_ms = start.elapsed().as_millis() as u64, batch = inputs.len(), "slow local embedding");
        }
        Ok(rows)
    }
}
