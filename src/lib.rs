//! # Doku AI (library root)
//!
//! Ask questions about a document you upload. Doku extracts the document's
//! text, splits it into overlapping chunks, embeds them, and answers each
//! question from the chunks closest to it (retrieval-augmented generation).
//!
//! - Loading and storing uploads (`document`, `storage`).
//! - Chunking, embedding and indexing (`splitter`, `embeddings`,
//!   `sentence_model`, `vector_store`).
//! - Answer generation (`api`, `template`, `pipeline`).
//! - Per-user state and the web surface (`session`, `server`).
//! - Configuration and the CLI (`config`, `commands`).
//!
//! ## Data flow
//!
//! ```text
//! upload ─▶ UploadStore ─▶ Ingestor ─▶ RagPipeline ─▶ Session ◀─ question
//!                                          │
//!                          embed ─▶ top-k ─▶ prompt ─▶ chat model ─▶ answer
//! ```
//!
//! ## Configuration directory
//!
//! `config.yaml` and `templates/` live in the per-platform directory returned by
//! [`config_dir`]:
//!
//! - macOS: `~/Library/Application Support/com.doku-ai.doku`
//! - Linux (XDG): `~/.config/doku`
//! - Windows: `C:\Users\<you>\AppData\Roaming\doku-ai\doku\config`

use directories::ProjectDirs;
use std::path::PathBuf;

pub mod api;
pub mod commands;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod pipeline;
pub mod sentence_model;
pub mod server;
pub mod session;
pub mod splitter;
pub mod storage;
pub mod template;
pub mod vector_store;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{DokuError, Result};

/// Return the per-platform configuration directory used by Doku.
///
/// The directory is **not** created by this function; `doku init` creates it.
///
/// # Errors
/// [`DokuError::NoConfigDir`] if the platform has no home directory to anchor
/// it (rare, but possible in sandboxed environments).
///
/// # Examples
/// ```rust
/// let cfg = doku::config_dir().expect("has a config dir");
/// println!("config at {}", cfg.display());
/// ```
pub fn config_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "doku-ai", "doku").ok_or(DokuError::NoConfigDir)?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
