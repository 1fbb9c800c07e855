//! # Sessions
//!
//! Every browser tab (or API client) works against its own [`Session`]: its own
//! upload directory, its own index and its own transcript. Sessions are created
//! and looked up through the [`SessionRegistry`] by a server-issued UUID.
//!
//! ## Ingestion lifecycle
//!
//! ```text
//!            upload                 ingest ok
//!   Empty ──────────▶ Indexing ─────────────────▶ Ready
//!                        │  ▲                       │
//!             ingest err │  └────── upload ─────────┘
//!                        ▼
//!                      Failed
//! ```
//!
//! Each upload bumps the session's generation counter. A background ingestion
//! only installs its pipeline if no newer upload has started in the meantime,
//! so the live index always belongs to the latest successfully indexed
//! document. A failed ingestion leaves the previous index answering.
//!
//! Sessions nobody has used for a while are dropped by
//! [`SessionRegistry::expire_idle`], together with their uploads.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};
use tokio::{
    sync::{Mutex, RwLock, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    document::DocumentInfo,
    error::{DokuError, Result},
    pipeline::{Ingestor, RagPipeline, SourceRef},
    storage::UploadStore,
};

/// Answer given when a question arrives before any document was indexed.
pub const NO_DOCUMENT_MESSAGE: &str = "Please upload a document first.";

/// Answer given while the session's document is still being indexed.
pub const INDEXING_MESSAGE: &str = "The document is still being indexed. Please try again shortly.";

/// Where a session's document is in the ingestion lifecycle.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IngestStatus {
    Empty,
    Indexing {
        filename: String,
    },
    Ready {
        filename: String,
        documents: Vec<DocumentInfo>,
        chunks: usize,
    },
    Failed {
        filename: String,
        error: String,
    },
}

impl IngestStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, IngestStatus::Indexing { .. })
    }
}

/// One question/answer exchange.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub asked_at: DateTime<Utc>,
}

/// Snapshot of a session for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: IngestStatus,
    pub turns: Vec<Turn>,
}

/// Handle on a background ingestion started by [`Session::upload`].
pub struct IngestJob {
    pub generation: u64,
    handle: JoinHandle<Result<()>>,
}

impl IngestJob {
    /// Waits for the ingestion to finish and returns its outcome.
    pub async fn wait(self) -> Result<()> {
        self.handle.await?
    }
}

pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    storage: UploadStore,
    pipeline: RwLock<Option<Arc<RagPipeline>>>,
    status: watch::Sender<IngestStatus>,
    generation: AtomicU64,
    upload_lock: Mutex<()>,
    transcript: RwLock<Vec<Turn>>,
    last_active: std::sync::Mutex<Instant>,
}

impl Session {
    pub fn new(id: Uuid, storage: UploadStore) -> Self {
        let (status, _) = watch::channel(IngestStatus::Empty);
        Self {
            id,
            created_at: Utc::now(),
            storage,
            pipeline: RwLock::new(None),
            status,
            generation: AtomicU64::new(0),
            upload_lock: Mutex::new(()),
            transcript: RwLock::new(Vec::new()),
            last_active: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn storage(&self) -> &UploadStore {
        &self.storage
    }

    pub fn status(&self) -> IngestStatus {
        self.status.borrow().clone()
    }

    /// Marks the session as in use, postponing idle expiry.
    pub fn touch(&self) {
        if let Ok(mut last_active) = self.last_active.lock() {
            *last_active = Instant::now();
        }
    }

    /// How long the session has gone without a request, as of `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        self.last_active
            .lock()
            .map(|last_active| now.saturating_duration_since(*last_active))
            .unwrap_or_default()
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<IngestStatus> {
        self.status.subscribe()
    }

    /// Stores `bytes` as the session's only document and starts indexing it.
    ///
    /// The previous index keeps answering until the new one is installed, and
    /// stays in place if the new document fails to index.
    pub async fn upload(
        self: &Arc<Self>,
        ingestor: Arc<Ingestor>,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestJob> {
        self.touch();
        let _guard = self.upload_lock.lock().await;

        let storage = self.storage.clone();
        let name = filename.to_string();
        let path =
            tokio::task::spawn_blocking(move || storage.replace(&name, &bytes)).await??;
        let stored = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());

        let generation = {
            let _slot = self.pipeline.write().await;
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.status.send_replace(IngestStatus::Indexing {
                filename: stored.clone(),
            });
            generation
        };
        info!(
            "Session {}: indexing {} (generation {})",
            self.id, stored, generation
        );

        let session = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let result = ingestor.ingest_store(&session.storage).await;
            session.finish_ingest(generation, &stored, result).await
        });

        Ok(IngestJob { generation, handle })
    }

    /// Installs the outcome of ingestion `generation` unless a newer upload
    /// has superseded it.
    async fn finish_ingest(
        &self,
        generation: u64,
        filename: &str,
        result: Result<RagPipeline>,
    ) -> Result<()> {
        let mut slot = self.pipeline.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(
                "Session {}: discarding stale ingestion of {} (generation {})",
                self.id, filename, generation
            );
            return result.map(|_| ());
        }

        match result {
            Ok(pipeline) => {
                info!(
                    "Session {}: {} ready with {} chunk(s)",
                    self.id,
                    filename,
                    pipeline.chunk_count()
                );
                self.status.send_replace(IngestStatus::Ready {
                    filename: filename.to_string(),
                    documents: pipeline.documents().to_vec(),
                    chunks: pipeline.chunk_count(),
                });
                *slot = Some(Arc::new(pipeline));
                Ok(())
            }
            Err(err) => {
                warn!("Session {}: ingestion of {} failed: {}", self.id, filename, err);
                self.status.send_replace(IngestStatus::Failed {
                    filename: filename.to_string(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Answers `question` from the session's current index and records the turn.
    ///
    /// Without an index the answer is [`NO_DOCUMENT_MESSAGE`] (or
    /// [`INDEXING_MESSAGE`] while one is being built); that is a normal answer,
    /// not an error.
    pub async fn ask(&self, question: &str) -> Result<Turn> {
        self.touch();
        let question = question.trim();
        if question.is_empty() {
            return Err(DokuError::InvalidRequest(
                "question must not be empty".to_string(),
            ));
        }

        let pipeline = self.pipeline.read().await.clone();
        let (answer, sources) = match pipeline {
            Some(pipeline) => {
                let answer = pipeline.answer(question).await?;
                (answer.text, answer.sources)
            }
            None => (self.idle_message().to_string(), Vec::new()),
        };

        let turn = Turn {
            question: question.to_string(),
            answer,
            sources,
            asked_at: Utc::now(),
        };
        self.transcript.write().await.push(turn.clone());
        Ok(turn)
    }

    fn idle_message(&self) -> &'static str {
        if self.status.borrow().is_settled() {
            NO_DOCUMENT_MESSAGE
        } else {
            INDEXING_MESSAGE
        }
    }

    pub async fn transcript(&self) -> Vec<Turn> {
        self.transcript.read().await.clone()
    }

    pub async fn summary(&self) -> SessionSummary {
        self.touch();
        SessionSummary {
            session_id: self.id,
            created_at: self.created_at,
            status: self.status(),
            turns: self.transcript().await,
        }
    }
}

/// All live sessions, each with an upload directory under `root`.
pub struct SessionRegistry {
    root: UploadStore,
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(root: UploadStore) -> Self {
        Self {
            root,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(&self) -> Result<Arc<Session>> {
        let id = Uuid::new_v4();
        let storage = self.root.child(&id.to_string())?;
        let session = Arc::new(Session::new(id, storage));
        self.sessions.write().await.insert(id, Arc::clone(&session));
        info!("Created session {}", id);
        Ok(session)
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Forgets the session and deletes its uploads. Returns `false` for an
    /// unknown id.
    pub async fn remove(&self, id: &Uuid) -> Result<bool> {
        let Some(session) = self.sessions.write().await.remove(id) else {
            return Ok(false);
        };
        let storage = session.storage.clone();
        tokio::task::spawn_blocking(move || storage.destroy()).await??;
        info!("Removed session {}", id);
        Ok(true)
    }

    /// Removes every session idle for longer than `ttl`. Sessions with an
    /// ingestion in flight are kept. Returns the ids that were removed.
    pub async fn expire_idle(&self, ttl: Duration) -> Result<Vec<Uuid>> {
        self.expire_idle_at(Instant::now(), ttl).await
    }

    async fn expire_idle_at(&self, now: Instant, ttl: Duration) -> Result<Vec<Uuid>> {
        let expired: Vec<Uuid> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|session| session.status().is_settled() && session.idle_for(now) > ttl)
            .map(|session| session.id)
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for id in expired {
            if self.remove(&id).await? {
                removed.push(id);
            }
        }
        if !removed.is_empty() {
            info!("Expired {} idle session(s)", removed.len());
        }
        Ok(removed)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
