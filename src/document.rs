//! Document loading and text extraction.
//!
//! PDFs go through `pdf-extract` on a blocking thread (the parser is CPU-bound
//! and can panic on malformed input, which surfaces here as an error instead of
//! taking down a worker). `.txt` and `.md` files are read as UTF-8.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::error::{DokuError, Result};

static HORIZONTAL_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());
static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").unwrap());

/// A loaded document: its name, extracted text and content digest.
#[derive(Debug, Clone)]
pub struct Document {
    pub filename: String,
    pub text: String,
    /// SHA-256 of the raw file bytes.
    pub digest: String,
}

/// Summary of an indexed document, reported back to clients.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DocumentInfo {
    pub filename: String,
    pub digest: String,
    pub chunks: usize,
}

impl Document {
    /// Builds a document from raw bytes, picking the extractor by file extension.
    pub async fn from_bytes(filename: &str, bytes: Vec<u8>) -> Result<Document> {
        let digest = sha256::digest(bytes.as_slice());
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let raw = match extension.as_str() {
            "pdf" => extract_pdf(filename, bytes).await?,
            "txt" | "md" => String::from_utf8(bytes).map_err(|err| DokuError::Extraction {
                file: filename.to_string(),
                reason: err.to_string(),
            })?,
            _ => return Err(DokuError::UnsupportedDocument(filename.to_string())),
        };

        let text = normalize_text(&raw);
        debug!(
            "Extracted {} characters from {}",
            text.chars().count(),
            filename
        );

        Ok(Document {
            filename: filename.to_string(),
            text,
            digest,
        })
    }
}

/// Reads and extracts the document at `path`.
pub async fn load(path: &Path) -> Result<Document> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| DokuError::InvalidUpload(path.display().to_string()))?
        .to_string();
    let bytes = tokio::fs::read(path).await?;
    Document::from_bytes(&filename, bytes).await
}

async fn extract_pdf(filename: &str, bytes: Vec<u8>) -> Result<String> {
    let file = filename.to_string();
    let extracted = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem(&bytes).map_err(|err| err.to_string())
    })
    .await
    .map_err(|err| DokuError::Extraction {
        file: file.clone(),
        reason: format!("PDF parser aborted: {err}"),
    })?;

    extracted.map_err(|reason| DokuError::Extraction { file, reason })
}

/// Collapses runs of spaces/tabs and squeezes blank-line runs down to one
/// paragraph break. Line structure is kept for the splitter.
pub fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace(['\r', '\u{c}'], "\n");
    let spaced = HORIZONTAL_WS.replace_all(&unified, " ");
    let squeezed = EXCESS_NEWLINES.replace_all(&spaced, "\n\n");
    squeezed.trim().to_string()
}
