//! # Local sentence embeddings
//!
//! An [`Embedder`] that needs no API: a sentence-transformers BERT model
//! (all-MiniLM-L6-v2 by default, 384 dimensions) run on the CPU with candle.
//! Weights are fetched from the Hugging Face Hub on first use and cached by
//! `hf-hub`.
//!
//! Inference is CPU-bound, so every call runs on a blocking thread, and
//! documents are encoded in parallel with rayon.

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use rayon::prelude::*;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::info;

use crate::embeddings::Embedder;
use crate::error::{DokuError, Result};

fn model_err(err: impl std::fmt::Display) -> DokuError {
    DokuError::Model(err.to_string())
}

/// Sentence embeddings model using Candle (pure Rust)
pub struct SentenceEmbeddingsModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl SentenceEmbeddingsModel {
    /// Load `model_id` (a Hugging Face repository) from the hub cache,
    /// downloading it if needed.
    pub fn load(model_id: &str) -> Result<Self> {
        let device = Device::Cpu;

        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());
        let api = Api::new().map_err(model_err)?;
        let api_repo = api.repo(repo);

        let config_filename = api_repo.get("config.json").map_err(model_err)?;
        let tokenizer_filename = api_repo.get("tokenizer.json").map_err(model_err)?;
        let weights_filename = api_repo.get("model.safetensors").map_err(model_err)?;

        let config = std::fs::read_to_string(config_filename)?;
        let config: Config = serde_json::from_str(&config).map_err(model_err)?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename).map_err(model_err)?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)
                .map_err(model_err)?
        };
        let model = BertModel::load(vb, &config).map_err(model_err)?;

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    /// Encode text into an L2-normalised embedding.
    pub fn encode(&self, text: &str) -> Result<Vec<f32>> {
        // the tokenizer truncates at the model's 512-token limit
        let tokens = self.tokenizer.encode(text, true).map_err(model_err)?;

        let token_ids = Tensor::new(tokens.get_ids(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(model_err)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(model_err)?;

        let output = self
            .model
            .forward(&token_ids, &token_type_ids, None)
            .map_err(model_err)?;

        let embedding = self
            .mean_pooling(&output, tokens.get_attention_mask())
            .and_then(|pooled| Self::normalize(&pooled))
            .map_err(model_err)?;

        embedding.to_vec1::<f32>().map_err(model_err)
    }

    /// Mean over token embeddings, ignoring padding.
    ///
    /// `embeddings` is `[1, seq_len, hidden]`; the mask is reshaped to
    /// `[1, seq_len, 1]` so it broadcasts over the hidden dimension.
    fn mean_pooling(
        &self,
        embeddings: &Tensor,
        attention_mask: &[u32],
    ) -> candle_core::Result<Tensor> {
        let mask = Tensor::new(attention_mask, &self.device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;

        let sum = embeddings.broadcast_mul(&mask)?.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;

        sum.broadcast_div(&count)?.squeeze(0)
    }

    fn normalize(tensor: &Tensor) -> candle_core::Result<Tensor> {
        let norm = tensor.sqr()?.sum_all()?.sqrt()?;
        tensor.broadcast_div(&norm)
    }
}

/// [`Embedder`] backed by a [`SentenceEmbeddingsModel`].
#[derive(Clone)]
pub struct LocalEmbedder {
    model: Arc<SentenceEmbeddingsModel>,
}

impl LocalEmbedder {
    /// Loads the model on a blocking thread.
    pub async fn load(model_id: &str) -> Result<Self> {
        let id = model_id.to_string();
        info!("Loading local embedding model {}", id);
        let model = tokio::task::spawn_blocking(move || SentenceEmbeddingsModel::load(&id)).await??;
        Ok(Self {
            model: Arc::new(model),
        })
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            texts
                .par_iter()
                .map(|text| model.encode(text))
                .collect::<Result<Vec<_>>>()
        })
        .await?
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || model.encode(&text)).await?
    }
}
