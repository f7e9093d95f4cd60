//! TailGuard -- tailgating detection backend.
//!
//! This crate provides the incident log (store + alert policy), its durable
//! storage backends, the detector adapter, and the HTTP API that ingests
//! tailgating signals.

pub mod api;
pub mod config;
pub mod detect;
pub mod incident;
pub mod ingest;
pub mod storage;
pub mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::TailguardConfig;
use crate::detect::{Detector, HttpDetector, UnavailableDetector};
use crate::incident::IncidentStore;
use crate::ingest::Ingestor;

/// Open the configured backend and load the incident log.
pub fn open_store(config: &TailguardConfig) -> Result<IncidentStore> {
    let backend = storage::open_backend(&config.storage).with_context(|| {
        format!("failed to open incident storage at {}", config.storage.path.display())
    })?;
    let store = IncidentStore::open(backend)
        .context("failed to load incident log")?
        .with_slow_write_threshold(config.storage.slow_write_threshold());
    Ok(store)
}

/// Build the detector adapter from configuration.
pub fn build_detector(config: &TailguardConfig) -> Result<Arc<dyn Detector>> {
    let detector = &config.detector;
    match &detector.url {
        Some(url) => {
            tracing::info!(%url, model = %detector.model, "Using HTTP detector");
            let http = HttpDetector::new(url.as_str(), detector.model.as_str(), detector.timeout())
                .context("failed to build detector client")?;
            Ok(Arc::new(http))
        }
        None => {
            tracing::info!("No detector URL configured; detection endpoints are disabled");
            Ok(Arc::new(UnavailableDetector::new(detector.model.as_str())))
        }
    }
}

/// Wire store, detector and ingestion together.
pub fn build_ingestor(config: &TailguardConfig) -> Result<Ingestor> {
    let store = Arc::new(open_store(config)?);
    let detector = build_detector(config)?;
    Ok(Ingestor::new(store, detector, config.detector.source_label.as_str()))
}

/// Start the TailGuard daemon: load the incident log and serve the API.
pub async fn serve(config: TailguardConfig) -> Result<()> {
    // 1. Initialize storage and detector
    tracing::info!(path = %config.storage.path.display(), backend = ?config.storage.backend, "Initializing incident log");
    let ingest = build_ingestor(&config)?;
    let total = ingest.incident_count().await?;

    // 2. Start API server
    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let app = api::router(api::state::AppState::new(ingest));

    tracing::info!(%addr, incidents = total, "TailGuard listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("TailGuard stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
