//! # Embedding services
//!
//! The ingestion pipeline only needs two things from an embedding service:
//! one vector per chunk, and one vector per question. [`Embedder`] captures
//! that contract; the pipeline never knows which implementation it holds.
//!
//! - [`OpenAiEmbedder`] calls an OpenAI-compatible `/embeddings` endpoint
//!   (Google's Gemini endpoint by default), in batches, with bounded
//!   concurrency.
//! - [`crate::sentence_model::LocalEmbedder`] runs all-MiniLM-L6-v2 in process.

use async_openai::{Client, config::OpenAIConfig, types::CreateEmbeddingRequestArgs};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use std::sync::Arc;
use tracing::debug;

use crate::{
    api::create_client,
    config::{DokuConfig, EmbeddingBackend},
    error::{DokuError, Result},
    sentence_model::LocalEmbedder,
};

/// Turns text into dense vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// The vector used to look up chunks for a question.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Builds the embedder selected by `config.embedding.backend`.
pub async fn build_embedder(config: &DokuConfig) -> Result<Arc<dyn Embedder>> {
    match config.embedding.backend {
        EmbeddingBackend::Remote => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        EmbeddingBackend::Local => {
            Ok(Arc::new(LocalEmbedder::load(&config.embedding.local_model).await?))
        }
    }
}

/// Embeddings from an OpenAI-compatible HTTP endpoint.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    batch_size: usize,
    concurrency: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &DokuConfig) -> Result<Self> {
        Ok(Self {
            client: create_client(config)?,
            model: config.embedding.model.clone(),
            batch_size: config.embedding.batch_size.max(1),
            concurrency: config.embedding.concurrency.max(1),
        })
    }

    async fn embed_batch(&self, batch: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = batch.len();
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(batch)
            .build()
            .map_err(|err| DokuError::Embedding(err.to_string()))?;

        debug!("Embedding {} text(s) with {}", expected, self.model);
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|err| DokuError::Embedding(err.to_string()))?;

        let mut data = response.data;
        if data.len() != expected {
            return Err(DokuError::Embedding(format!(
                "expected {} embeddings, got {}",
                expected,
                data.len()
            )));
        }
        data.sort_by_key(|embedding| embedding.index);
        Ok(data.into_iter().map(|embedding| embedding.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // batches are owned so the buffered future stays Send
        let owned: Vec<Vec<String>> = texts
            .chunks(self.batch_size)
            .map(<[String]>::to_vec)
            .collect();
        let batches: Vec<Vec<Vec<f32>>> = stream::iter(owned)
            .map(|batch| async move { self.embed_batch(batch).await })
            .buffered(self.concurrency)
            .try_collect()
            .await?;
        Ok(batches.into_iter().flatten().collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| DokuError::Embedding("empty embedding response".to_string()))
    }
}
