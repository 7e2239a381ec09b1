mod api;
mod archive;
mod autocomplete;
mod builder;
mod classify;
mod config;
mod error;
#[cfg(test)]
mod fixtures;
mod models;
mod progress;
mod queue;
mod record;
mod reference;
mod service;
mod store;
mod tables;

use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use config::Config;
use models::JobRecord;
use service::ManifestService;
use tokio::sync::{mpsc, RwLock};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub service: Arc<ManifestService>,
    pub jobs: Arc<RwLock<HashMap<String, JobRecord>>>,
    pub queue_tx: mpsc::Sender<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "manifest_index=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    tokio::fs::create_dir_all(&config.data_root)
        .await
        .with_context(|| format!("Failed to create data root at {}", config.data_root.display()))?;

    let service = Arc::new(ManifestService::new(&config.data_root, config.scan_window));
    let warm_service = service.clone();
    match tokio::task::spawn_blocking(move || warm_service.warm()).await? {
        Ok(0) => info!("No shortcut tables yet, waiting for a manifest sync"),
        Ok(items) => info!(items, "Loaded autocomplete index from shortcut tables"),
        Err(err) => warn!("Failed to load existing shortcut tables: {err}"),
    }

    let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
    let state = AppState {
        config: config.clone(),
        service,
        jobs: Arc::new(RwLock::new(HashMap::new())),
        queue_tx,
    };

    queue::spawn_sync_worker(state.clone(), queue_rx);
    queue::spawn_cleanup_worker(state.clone());

    let app = Router::new()
        .route("/healthz", get(api::healthz))
        .route("/v1/manifest/sync", post(api::create_sync))
        .route(
            "/v1/manifest/sync/{job_id}",
            get(api::get_sync).delete(api::cancel_sync),
        )
        .route("/v1/items/suggest", get(api::suggest_items))
        .route("/v1/items/resolve", post(api::resolve_items))
        .route("/v1/characters/emblems", post(api::emblem_paths))
        .route("/v1/characters/definitions", get(api::character_definitions))
        .route("/v1/crafting/records", get(api::craftable_records))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(
        data_root = %config.data_root.display(),
        "manifest-index listening on {}",
        config.bind_addr
    );
    axum::serve(listener, app).await?;
    Ok(())
}
