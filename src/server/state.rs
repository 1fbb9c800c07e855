use std::sync::Arc;

use crate::{
    config::DokuConfig, pipeline::Ingestor, session::SessionRegistry, storage::UploadStore,
};

/// Shared by every request handler.
pub struct AppState {
    pub config: DokuConfig,
    pub sessions: SessionRegistry,
    pub ingestor: Arc<Ingestor>,
}

impl AppState {
    pub fn new(config: DokuConfig, uploads: UploadStore, ingestor: Ingestor) -> Self {
        Self {
            config,
            sessions: SessionRegistry::new(uploads),
            ingestor: Arc::new(ingestor),
        }
    }
}
