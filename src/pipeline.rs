//! # Ingestion and query pipelines
//!
//! [`Ingestor`] turns the documents in an [`UploadStore`] into a ready
//! [`RagPipeline`]:
//!
//! ```text
//! extract text ─▶ split into overlapping chunks ─▶ embed every chunk ─▶ build HNSW index
//! ```
//!
//! [`RagPipeline::answer`] runs the query side:
//!
//! ```text
//! embed question ─▶ top-k chunks ─▶ "\n\n"-joined context ─▶ render prompt ─▶ generate
//! ```
//!
//! A pipeline is immutable once built. Replacing the document means building a
//! new pipeline, never updating an existing index.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{path::Path, sync::Arc};
use tracing::{debug, info};

use crate::{
    api::Generator,
    config::DokuConfig,
    document::{self, Document, DocumentInfo},
    embeddings::Embedder,
    error::{DokuError, Result},
    splitter::{Chunk, TextSplitter},
    storage::UploadStore,
    template::PromptTemplate,
    vector_store::{ScoredChunk, VectorStore},
};

/// Where a piece of an answer's context came from.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceRef {
    pub source: String,
    pub chunk_index: usize,
    pub distance: f32,
    /// First characters of the chunk, for display.
    pub excerpt: String,
}

/// A generated answer and the chunks it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
}

/// Builds query pipelines from stored documents.
pub struct Ingestor {
    splitter: TextSplitter,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    template: Arc<PromptTemplate>,
    top_k: usize,
}

impl Ingestor {
    pub fn new(
        config: &DokuConfig,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        template: PromptTemplate,
    ) -> Result<Self> {
        template.validate()?;
        Ok(Self {
            splitter: TextSplitter::new(config.chunk_size, config.chunk_overlap)?,
            embedder,
            generator,
            template: Arc::new(template),
            top_k: config.top_k.max(1),
        })
    }

    /// Indexes every supported document in `store`.
    pub async fn ingest_store(&self, store: &UploadStore) -> Result<RagPipeline> {
        let store = store.clone();
        let paths = tokio::task::spawn_blocking(move || store.documents()).await??;
        if paths.is_empty() {
            return Err(DokuError::EmptyDocument);
        }
        self.ingest_paths(&paths).await
    }

    /// Indexes the documents at `paths`.
    pub async fn ingest_paths(&self, paths: &[impl AsRef<Path>]) -> Result<RagPipeline> {
        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            documents.push(document::load(path.as_ref()).await?);
        }
        self.ingest(documents).await
    }

    /// Splits, embeds and indexes already-loaded documents.
    pub async fn ingest(&self, documents: Vec<Document>) -> Result<RagPipeline> {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut infos = Vec::with_capacity(documents.len());
        for document in &documents {
            let document_chunks = self.splitter.split_document(document);
            debug!(
                "{} split into {} chunk(s)",
                document.filename,
                document_chunks.len()
            );
            infos.push(DocumentInfo {
                filename: document.filename.clone(),
                digest: document.digest.clone(),
                chunks: document_chunks.len(),
            });
            chunks.extend(document_chunks);
        }

        if chunks.is_empty() {
            return Err(DokuError::EmptyDocument);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(DokuError::Embedding(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let pairs: Vec<(Vec<f32>, Chunk)> = vectors.into_iter().zip(chunks).collect();
        let index = tokio::task::spawn_blocking(move || VectorStore::build(pairs)).await??;

        info!(
            "Indexed {} chunk(s) from {} document(s)",
            index.len(),
            infos.len()
        );

        Ok(RagPipeline {
            index,
            embedder: Arc::clone(&self.embedder),
            generator: Arc::clone(&self.generator),
            template: Arc::clone(&self.template),
            top_k: self.top_k,
            documents: infos,
            built_at: Utc::now(),
        })
    }
}

/// A question-answering pipeline bound to one immutable index.
pub struct RagPipeline {
    index: VectorStore,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    template: Arc<PromptTemplate>,
    top_k: usize,
    documents: Vec<DocumentInfo>,
    built_at: DateTime<Utc>,
}

impl RagPipeline {
    pub fn documents(&self) -> &[DocumentInfo] {
        &self.documents
    }

    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// The `top_k` chunks closest to `question`, best first.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk<'_>>> {
        let vector = self.embedder.embed_query(question).await?;
        self.index.search(&vector, self.top_k)
    }

    /// Retrieves context for `question`, renders the prompt and generates an answer.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let hits = self.retrieve(question).await?;
        let context = format_context(&hits);
        let prompt = self.template.render(&context, question);
        debug!("Rendered prompt with {} context chunk(s)", hits.len());

        let text = self
            .generator
            .generate(self.template.system_prompt.as_deref(), &prompt)
            .await?;

        let sources = hits
            .iter()
            .map(|hit| SourceRef {
                source: hit.chunk.source.clone(),
                chunk_index: hit.chunk.index,
                distance: hit.distance,
                excerpt: hit.chunk.text.chars().take(160).collect(),
            })
            .collect();

        Ok(Answer { text, sources })
    }
}

/// Joins retrieved chunk texts with blank lines.
pub fn format_context(hits: &[ScoredChunk<'_>]) -> String {
    hits.iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EchoGenerator, HashEmbedder, test_ingestor};

    fn document(filename: &str, text: &str) -> Document {
        Document {
            filename: filename.to_string(),
            text: text.to_string(),
            digest: format!("digest-{filename}"),
        }
    }

    #[tokio::test]
    async fn test_answer_is_grounded_on_matching_chunk() {
        let ingestor = test_ingestor(60, 10, 1);
        let pipeline = ingestor
            .ingest(vec![document(
                "manual.txt",
                "The pump warranty lasts five years.\n\nBananas are rich in potassium.\n\nThe office closes at six.",
            )])
            .await
            .unwrap();

        let answer = pipeline.answer("How long does the pump warranty last?").await.unwrap();

        assert!(answer.text.contains("The pump warranty lasts five years."));
        assert!(answer.text.contains("How long does the pump warranty last?"));
        assert!(!answer.text.contains("Bananas"));
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].source, "manual.txt");
        assert_eq!(answer.sources[0].chunk_index, 0);
    }

    #[tokio::test]
    async fn test_retrieve_returns_at_most_top_k() {
        let ingestor = test_ingestor(30, 5, 2);
        let text = (0..10)
            .map(|i| format!("Paragraph number {i} talks about topic {i}."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let pipeline = ingestor.ingest(vec![document("topics.txt", &text)]).await.unwrap();

        let hits = pipeline.retrieve("topic 7").await.unwrap();

        assert_eq!(hits.len(), 2);
        assert!(pipeline.chunk_count() >= 10);
        assert_eq!(pipeline.documents()[0].filename, "topics.txt");
        assert_eq!(pipeline.documents()[0].chunks, pipeline.chunk_count());
    }

    #[tokio::test]
    async fn test_empty_document_is_rejected() {
        let ingestor = test_ingestor(100, 10, 4);
        let result = ingestor.ingest(vec![document("blank.txt", "   \n\n ")]).await;
        assert!(matches!(result, Err(DokuError::EmptyDocument)));
    }

    #[tokio::test]
    async fn test_ingest_store_reads_uploaded_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path()).unwrap();
        store
            .save("facts.txt", b"Saturn has a prominent ring system.")
            .unwrap();

        let pipeline = test_ingestor(200, 20, 4).ingest_store(&store).await.unwrap();
        let answer = pipeline.answer("Which planet has rings?").await.unwrap();

        assert!(answer.text.contains("Saturn has a prominent ring system."));
    }

    #[tokio::test]
    async fn test_ingest_empty_store_is_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path()).unwrap();
        let result = test_ingestor(200, 20, 4).ingest_store(&store).await;
        assert!(matches!(result, Err(DokuError::EmptyDocument)));
    }

    #[test]
    fn test_format_context_joins_with_blank_lines() {
        let a = Chunk {
            source: "d".into(),
            index: 0,
            start: 0,
            text: "alpha".into(),
        };
        let b = Chunk {
            source: "d".into(),
            index: 1,
            start: 6,
            text: "beta".into(),
        };
        let hits = vec![
            ScoredChunk { chunk: &a, distance: 0.1 },
            ScoredChunk { chunk: &b, distance: 0.2 },
        ];
        assert_eq!(format_context(&hits), "alpha\n\nbeta");
    }

    #[tokio::test]
    async fn test_invalid_template_is_rejected() {
        let config = DokuConfig::default();
        let template = PromptTemplate {
            system_prompt: None,
            prompt: "no placeholders".to_string(),
        };
        let result = Ingestor::new(
            &config,
            Arc::new(HashEmbedder::default()),
            Arc::new(EchoGenerator),
            template,
        );
        assert!(matches!(result, Err(DokuError::Template(_))));
    }
}
