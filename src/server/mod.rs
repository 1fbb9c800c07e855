//! HTTP surface: the embedded chat page plus a small JSON API over sessions.

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

use std::{sync::Arc, time::Duration};
use tokio::{
    net::TcpListener,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{info, warn};

use crate::{
    api::{Generator, OpenAiGenerator},
    config::DokuConfig,
    embeddings::build_embedder,
    error::Result,
    pipeline::Ingestor,
    storage::UploadStore,
    template::{PromptTemplate, load_template},
};

pub use router::router;
pub use state::AppState;

/// Builds the ingestion stack described by `config`.
///
/// Fails before anything is served if the credential is missing or the
/// configured template cannot be loaded.
pub async fn build_ingestor(config: &DokuConfig) -> Result<Ingestor> {
    config.validate()?;
    config.resolve_api_key()?;

    let embedder = build_embedder(config).await?;
    let generator: Arc<dyn Generator> = Arc::new(OpenAiGenerator::new(config)?);
    let template = match &config.template {
        Some(name) => load_template(name)?,
        None => PromptTemplate::default(),
    };
    Ingestor::new(config, embedder, generator, template)
}

/// Empties the upload directory, then serves until Ctrl-C.
pub async fn serve(config: DokuConfig) -> Result<()> {
    let uploads = UploadStore::open(&config.upload_dir)?;
    let report = {
        let uploads = uploads.clone();
        tokio::task::spawn_blocking(move || uploads.clear()).await?
    };
    info!(
        "Cleared {} ({} removed, {} failed)",
        uploads.path().display(),
        report.removed,
        report.failed
    );

    let ingestor = build_ingestor(&config).await?;
    let address = config.bind_address();
    let state = Arc::new(AppState::new(config, uploads, ingestor));

    let listener = TcpListener::bind(&address).await?;
    info!("Doku listening on http://{}", listener.local_addr()?);

    let sweeper = spawn_session_sweeper(Arc::clone(&state));
    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    served?;

    info!("Server stopped");
    Ok(())
}

/// Periodically drops sessions idle for longer than `session_ttl_secs`.
///
/// Returns `None` when expiry is disabled.
fn spawn_session_sweeper(state: Arc<AppState>) -> Option<JoinHandle<()>> {
    if state.config.session_ttl_secs == 0 {
        info!("Session expiry disabled");
        return None;
    }
    let ttl = Duration::from_secs(state.config.session_ttl_secs);
    let period = sweep_period(ttl);
    info!("Expiring sessions idle for {:?}, checking every {:?}", ttl, period);

    Some(tokio::spawn(async move {
        let mut ticks = interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticks.tick().await;
        loop {
            ticks.tick().await;
            if let Err(err) = state.sessions.expire_idle(ttl).await {
                warn!("Session sweep failed: {}", err);
            }
        }
    }))
}

fn sweep_period(ttl: Duration) -> Duration {
    (ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(60))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for Ctrl-C: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
