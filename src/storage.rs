//! # Upload storage
//!
//! The storage area is a plain directory. The server owns one root store,
//! emptied at startup, and hands each session its own subdirectory so uploads
//! from different users never land in the same ingestion run.
//!
//! Uploads arrive base64-encoded, either raw or as a browser `data:` URL
//! (`data:application/pdf;base64,JVBERi0x...`). [`decode_payload`] accepts both.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use crate::error::{DokuError, Result};

/// File extensions the document loader understands.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

/// Outcome of a best-effort [`UploadStore::clear`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClearReport {
    pub removed: usize,
    pub failed: usize,
}

/// A directory of uploaded documents.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    /// Opens (and creates, if needed) the directory at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// A store rooted at `<self>/<name>`, used for per-session uploads.
    pub fn child(&self, name: &str) -> Result<UploadStore> {
        UploadStore::open(self.dir.join(name))
    }

    /// Deletes every entry in the directory.
    ///
    /// Failures are logged and counted but never abort the sweep.
    pub fn clear(&self) -> ClearReport {
        let mut report = ClearReport::default();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Unable to list {}: {}", self.dir.display(), err);
                report.failed += 1;
                return report;
            }
        };

        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(err) => {
                    warn!("Error reading entry in {}: {}", self.dir.display(), err);
                    report.failed += 1;
                    continue;
                }
            };
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match removed {
                Ok(()) => report.removed += 1,
                Err(err) => {
                    warn!("Error deleting {}: {}", path.display(), err);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Writes `bytes` under the sanitised `filename` and returns the full path.
    pub fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let name = sanitize_filename(filename)?;
        let path = self.dir.join(name);
        fs::write(&path, bytes)?;
        info!("Saved upload {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Empties the directory, then saves the new upload. Each session keeps only
    /// its latest document.
    pub fn replace(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let name = sanitize_filename(filename)?;
        let report = self.clear();
        debug!(
            "Cleared {} previous upload(s) from {}",
            report.removed,
            self.dir.display()
        );
        self.save(&name, bytes)
    }

    /// Supported documents currently stored, sorted by file name.
    pub fn documents(&self) -> Result<Vec<PathBuf>> {
        let mut documents = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if is_supported(&path) {
                documents.push(path);
            } else {
                warn!("Skipping unsupported file {}", path.display());
            }
        }
        documents.sort();
        Ok(documents)
    }

    /// Removes the directory itself. Used when a session is dropped.
    pub fn destroy(self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

/// Whether `path` has one of [`SUPPORTED_EXTENSIONS`] (case-insensitive).
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Reduces a client-supplied filename to a bare, supported file name.
///
/// Directory components are dropped (`../../etc/x.pdf` becomes `x.pdf`).
pub fn sanitize_filename(filename: &str) -> Result<String> {
    let name = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        return Err(DokuError::InvalidUpload(format!(
            "`{filename}` is not a usable file name"
        )));
    }
    if !is_supported(Path::new(name)) {
        return Err(DokuError::UnsupportedDocument(name.to_string()));
    }
    Ok(name.to_string())
}

/// Decodes a base64 upload payload, with or without a `data:` URL prefix.
pub fn decode_payload(contents: &str) -> Result<Vec<u8>> {
    let encoded = match contents.strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest.split_once(',').ok_or_else(|| {
                DokuError::InvalidUpload("data URL has no payload".to_string())
            })?;
            if !header.ends_with(";base64") {
                return Err(DokuError::InvalidUpload(
                    "data URL is not base64-encoded".to_string(),
                ));
            }
            data
        }
        None => contents,
    };

    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|err| DokuError::InvalidUpload(format!("invalid base64 payload: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_clear_empties_directory() {
        let root = tempdir().unwrap();
        let store = UploadStore::open(root.path()).unwrap();
        fs::write(root.path().join("old.pdf"), b"stale").unwrap();
        fs::write(root.path().join("notes.txt"), b"stale").unwrap();
        let nested = root.path().join("session-a");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("inner.pdf"), b"stale").unwrap();

        let report = store.clear();

        assert_eq!(report, ClearReport { removed: 3, failed: 0 });
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_open_creates_missing_directory() {
        let root = tempdir().unwrap();
        let dir = root.path().join("uploaded_pdfs");
        let store = UploadStore::open(&dir).unwrap();
        assert!(store.path().is_dir());
        assert_eq!(store.clear(), ClearReport::default());
    }

    #[test]
    fn test_save_sample_pdf_is_byte_identical() {
        let root = tempdir().unwrap();
        let store = UploadStore::open(root.path()).unwrap();
        let original: Vec<u8> = b"%PDF-1.4\n\x00\x01\xfe\xff binary tail".to_vec();
        let payload = format!("data:application/pdf;base64,{}", STANDARD.encode(&original));

        let bytes = decode_payload(&payload).unwrap();
        let path = store.save("sample.pdf", &bytes).unwrap();

        assert_eq!(path, root.path().join("sample.pdf"));
        assert_eq!(fs::read(&path).unwrap(), original);
    }

    #[test]
    fn test_decode_raw_base64_with_line_breaks() {
        let encoded = STANDARD.encode(b"hello world, this is a document");
        let (head, tail) = encoded.split_at(10);
        let wrapped = format!("{head}\n{tail}\n");
        assert_eq!(
            decode_payload(&wrapped).unwrap(),
            b"hello world, this is a document"
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_payload("not base64 at all!!"),
            Err(DokuError::InvalidUpload(_))
        ));
        assert!(matches!(
            decode_payload("data:text/plain,hello"),
            Err(DokuError::InvalidUpload(_))
        ));
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/report.pdf").unwrap(), "report.pdf");
        assert_eq!(sanitize_filename("C:\\Users\\me\\Notes.MD").unwrap(), "Notes.MD");
        assert!(matches!(
            sanitize_filename("dir/"),
            Err(DokuError::InvalidUpload(_))
        ));
        assert!(matches!(
            sanitize_filename("payload.exe"),
            Err(DokuError::UnsupportedDocument(_))
        ));
    }

    #[test]
    fn test_replace_keeps_only_latest_upload() {
        let root = tempdir().unwrap();
        let store = UploadStore::open(root.path()).unwrap();
        store.save("first.pdf", b"one").unwrap();

        store.replace("second.txt", b"two").unwrap();

        let documents = store.documents().unwrap();
        assert_eq!(documents, vec![root.path().join("second.txt")]);
    }

    #[test]
    fn test_documents_skips_unsupported_files() {
        let root = tempdir().unwrap();
        let store = UploadStore::open(root.path()).unwrap();
        fs::write(root.path().join("b.pdf"), b"b").unwrap();
        fs::write(root.path().join("a.txt"), b"a").unwrap();
        fs::write(root.path().join("image.png"), b"png").unwrap();

        let documents = store.documents().unwrap();
        assert_eq!(
            documents,
            vec![root.path().join("a.txt"), root.path().join("b.pdf")]
        );
    }

    #[test]
    fn test_child_store_and_destroy() {
        let root = tempdir().unwrap();
        let store = UploadStore::open(root.path()).unwrap();
        let child = store.child("abc").unwrap();
        child.save("doc.txt", b"text").unwrap();
        assert!(root.path().join("abc/doc.txt").is_file());

        child.destroy().unwrap();
        assert!(!root.path().join("abc").exists());
    }
}
