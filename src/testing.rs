//! Deterministic stand-ins for the remote services, shared by unit tests.

use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    api::Generator,
    config::DokuConfig,
    embeddings::Embedder,
    error::{DokuError, Result},
    pipeline::Ingestor,
    template::PromptTemplate,
};

const DIMENSION: usize = 256;

/// Bag-of-words embedder: each lowercased word is hashed into one of
/// [`DIMENSION`] buckets, then the vector is normalised.
#[derive(Default)]
pub(crate) struct HashEmbedder;

impl HashEmbedder {
    pub(crate) fn embed(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            vector[fnv1a(&word.to_lowercase()) % DIMENSION] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

fn fnv1a(word: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash as usize
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| Self::embed(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::embed(text))
    }
}

/// Embedder whose every call fails.
pub(crate) struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(DokuError::Embedding("service unavailable".to_string()))
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Err(DokuError::Embedding("service unavailable".to_string()))
    }
}

/// Generator that answers with the prompt it was given.
pub(crate) struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(&self, _system_prompt: Option<&str>, prompt: &str) -> Result<String> {
        Ok(prompt.to_string())
    }
}

pub(crate) fn test_config(chunk_size: usize, chunk_overlap: usize, top_k: usize) -> DokuConfig {
    DokuConfig {
        api_key: Some("test-key".to_string()),
        chunk_size,
        chunk_overlap,
        top_k,
        ..DokuConfig::default()
    }
}

pub(crate) fn test_ingestor(chunk_size: usize, chunk_overlap: usize, top_k: usize) -> Ingestor {
    Ingestor::new(
        &test_config(chunk_size, chunk_overlap, top_k),
        Arc::new(HashEmbedder),
        Arc::new(EchoGenerator),
        PromptTemplate::default(),
    )
    .expect("test ingestor")
}

pub(crate) fn failing_ingestor() -> Ingestor {
    Ingestor::new(
        &test_config(200, 20, 4),
        Arc::new(FailingEmbedder),
        Arc::new(EchoGenerator),
        PromptTemplate::default(),
    )
    .expect("failing ingestor")
}
