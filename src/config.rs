//! This module provides functionality for loading and handling the application's configuration.
//!
//! It defines the [`DokuConfig`] struct, which holds every tunable of the ingestion and
//! query pipelines plus the HTTP listener, and [`load_config`] to read it from YAML.
//!
//! Every field has a default, so a partial file is valid:
//!
//! ```yaml
//! chat_model: "gemini-2.5-flash-lite"
//! embedding:
//!   backend: remote
//! top_k: 4
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use doku::config::load_config;
//!
//! let config = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config.chat_model);
//! ```

use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};

use tracing::*;

use crate::error::{DokuError, Result};

/// Environment variable holding the API credential. Takes precedence over the file.
pub const API_KEY_ENV: &str = "DOKU_API_KEY";

/// Which embedding implementation the ingestion pipeline uses.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// An OpenAI-compatible `/embeddings` endpoint at `api_base`.
    #[default]
    Remote,
    /// A sentence-transformers BERT model run in process with candle.
    Local,
}

/// Settings for the embedding service.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,

    /// Model name sent to the remote endpoint.
    pub model: String,

    /// Hugging Face repository used by the local backend.
    pub local_model: String,

    /// Number of chunks per embedding request.
    pub batch_size: usize,

    /// Maximum number of embedding requests in flight during one ingestion.
    pub concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Remote,
            model: "gemini-embedding-001".to_string(),
            local_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            batch_size: 64,
            concurrency: 4,
        }
    }
}

/// Represents the application's configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct DokuConfig {
    /// Base URL of the OpenAI-compatible API (chat and remote embeddings).
    pub api_base: String,

    /// API credential. Overridden by `DOKU_API_KEY` when that is set.
    pub api_key: Option<String>,

    /// Chat model used to generate answers.
    pub chat_model: String,

    /// Sampling temperature; the provider default when unset.
    pub temperature: Option<f32>,

    /// Timeout applied to every outbound HTTP request.
    pub request_timeout_secs: u64,

    pub embedding: EmbeddingConfig,

    /// Target chunk length, in characters.
    pub chunk_size: usize,

    /// Characters shared between neighbouring chunks.
    pub chunk_overlap: usize,

    /// Number of chunks retrieved per question.
    pub top_k: usize,

    /// Name of a prompt template under `<config_dir>/templates/`.
    pub template: Option<String>,

    /// Directory holding uploaded documents. Emptied at startup.
    pub upload_dir: PathBuf,

    pub host: String,

    pub port: u16,

    /// Largest accepted upload request body.
    pub max_upload_bytes: usize,

    /// Sessions idle this long are dropped with their uploads. 0 keeps them forever.
    pub session_ttl_secs: u64,
}

impl Default for DokuConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            api_key: None,
            chat_model: "gemini-2.5-flash-lite".to_string(),
            temperature: None,
            request_timeout_secs: 120,
            embedding: EmbeddingConfig::default(),
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
            template: None,
            upload_dir: PathBuf::from("uploaded_pdfs"),
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_upload_bytes: 25 * 1024 * 1024,
            session_ttl_secs: 60 * 60,
        }
    }
}

impl DokuConfig {
    /// Returns the API key from `DOKU_API_KEY` or the config file.
    ///
    /// There is no fallback: a missing credential is a startup error.
    pub fn resolve_api_key(&self) -> Result<String> {
        self.resolve_api_key_from(env::var(API_KEY_ENV).ok())
    }

    fn resolve_api_key_from(&self, from_env: Option<String>) -> Result<String> {
        from_env
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                self.api_key
                    .clone()
                    .filter(|key| !key.trim().is_empty())
            })
            .ok_or(DokuError::MissingCredential)
    }

    /// Rejects settings the splitter, retriever or embedder cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(DokuError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(DokuError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(DokuError::Config("top_k must be positive".into()));
        }
        if self.embedding.batch_size == 0 || self.embedding.concurrency == 0 {
            return Err(DokuError::Config(
                "embedding.batch_size and embedding.concurrency must be positive".into(),
            ));
        }
        Ok(())
    }

    /// `host:port` for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Loads the application's configuration from a YAML file.
///
/// # Errors
///
/// Fails if the file cannot be read, is not valid YAML, or holds settings that
/// [`DokuConfig::validate`] rejects.
pub fn load_config(file: impl AsRef<Path>) -> Result<DokuConfig> {
    let file = file.as_ref();
    debug!("Loading config from {}", file.display());
    let content = fs::read_to_string(file)?;
    let config: DokuConfig = serde_yaml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Resolves the config the binary should run with.
///
/// An explicit path must exist. Without one, `<config_dir>/config.yaml` is used
/// when present and the built-in defaults otherwise.
pub fn load_or_default(explicit: Option<&Path>) -> Result<DokuConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    let default_path = crate::config_dir()?.join("config.yaml");
    if default_path.is_file() {
        load_config(&default_path)
    } else {
        info!(
            "No config at {}, using built-in defaults",
            default_path.display()
        );
        Ok(DokuConfig::default())
    }
}
