//! Error type shared by the ingestion, query and storage layers.
//!
//! Every fallible library function returns [`Result`]. The HTTP layer maps
//! these variants onto status codes in [`crate::server::error`].

use thiserror::Error;

/// Everything that can go wrong between an upload and an answer.
#[derive(Debug, Error)]
pub enum DokuError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(
        "no API key configured; set `api_key` in the config file or the DOKU_API_KEY environment variable"
    )]
    MissingCredential,

    #[error("unable to determine the configuration directory")]
    NoConfigDir,

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported document type: {0}")]
    UnsupportedDocument(String),

    #[error("failed to extract text from {file}: {reason}")]
    Extraction { file: String, reason: String },

    #[error("no text could be extracted from the uploaded document")]
    EmptyDocument,

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("generation request failed: {0}")]
    Generation(String),

    #[error("vector index error: {0}")]
    Index(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("local embedding model error: {0}")]
    Model(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DokuError>;
