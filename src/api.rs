use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::ManifestError,
    models::{
        EmblemRequest, JobRecord, JobState, ManifestRelease, ResolveItemsRequest, SuggestQuery,
        SyncRequest,
    },
    queue::error_code,
    AppState,
};

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "code": code,
                "message": message.into()
            }
        })),
    )
        .into_response()
}

fn manifest_error_response(err: ManifestError) -> Response {
    let status = match &err {
        ManifestError::ManifestUnavailable(_) | ManifestError::MissingTable(_) => {
            StatusCode::CONFLICT
        }
        err if err.is_structural() => StatusCode::UNPROCESSABLE_ENTITY,
        err if err.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("Lookup failed: {err}");
    }
    error_response(status, error_code(&err), err.to_string())
}

/// Runs a blocking lookup against the manifest off the async runtime.
async fn run_lookup<T, F>(state: &AppState, lookup: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&crate::service::ManifestService) -> Result<T, ManifestError> + Send + 'static,
{
    let service = state.service.clone();
    match tokio::task::spawn_blocking(move || lookup(&service)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(manifest_error_response(err)),
        Err(err) => {
            warn!("Lookup task join error: {err:#}");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL",
                "Lookup task failed",
            ))
        }
    }
}

pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "timestamp": Utc::now(),
        "indexedItems": state.service.index().len(),
        "manifestVersion": state.service.manifest_version(),
    }))
}

pub async fn create_sync(
    State(state): State<AppState>,
    Json(payload): Json<SyncRequest>,
) -> impl IntoResponse {
    if payload.version.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_SYNC_REQUEST",
            "Request must name a manifest version.",
        );
    }

    let job_id = Uuid::new_v4().to_string();
    let record = JobRecord::queued(
        job_id.clone(),
        ManifestRelease {
            version: payload.version.trim().to_string(),
            archive_path: payload.archive_path,
        },
    );
    let response = record.to_response();

    {
        let mut jobs = state.jobs.write().await;
        jobs.insert(job_id.clone(), record);
    }

    if state.queue_tx.send(job_id.clone()).await.is_err() {
        let mut jobs = state.jobs.write().await;
        jobs.remove(&job_id);
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "QUEUE_UNAVAILABLE",
            "Sync queue is unavailable.",
        );
    }

    (StatusCode::ACCEPTED, Json(response)).into_response()
}

pub async fn get_sync(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let jobs = state.jobs.read().await;
    let Some(job) = jobs.get(&job_id) else {
        return error_response(StatusCode::NOT_FOUND, "JOB_NOT_FOUND", "Sync job not found.");
    };
    (StatusCode::OK, Json(job.to_response())).into_response()
}

pub async fn cancel_sync(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let mut jobs = state.jobs.write().await;
    let Some(job) = jobs.get_mut(&job_id) else {
        return error_response(StatusCode::NOT_FOUND, "JOB_NOT_FOUND", "Sync job not found.");
    };

    if !job.status.is_finished() {
        job.cancel.cancel();
        job.status = JobState::Canceled;
        job.message = Some("Sync canceled".to_string());
        job.updated_at = Utc::now();
        job.release = None;
    }
    (StatusCode::OK, Json(job.to_response())).into_response()
}

pub async fn suggest_items(
    State(state): State<AppState>,
    Query(query): Query<SuggestQuery>,
) -> impl IntoResponse {
    let limit = query.effective_limit(state.config.suggest_limit);
    let items = state.service.suggest(&query.q, limit);
    Json(json!({ "query": query.q, "items": items }))
}

pub async fn resolve_items(
    State(state): State<AppState>,
    Json(payload): Json<ResolveItemsRequest>,
) -> Response {
    let hashes: HashSet<u32> = payload.hashes.into_iter().collect();
    match run_lookup(&state, move |service| service.resolve_items(&hashes)).await {
        Ok(items) => Json(json!({ "items": items })).into_response(),
        Err(response) => response,
    }
}

pub async fn emblem_paths(
    State(state): State<AppState>,
    Json(payload): Json<EmblemRequest>,
) -> Response {
    let by_hash: HashMap<u32, String> = payload
        .emblems
        .into_iter()
        .map(|(character_id, hash)| (hash, character_id))
        .collect();
    match run_lookup(&state, move |service| service.emblem_paths(&by_hash)).await {
        Ok(paths) => Json(json!({ "emblems": paths })).into_response(),
        Err(response) => response,
    }
}

pub async fn character_definitions(State(state): State<AppState>) -> Response {
    match run_lookup(&state, |service| service.character_definitions()).await {
        Ok(definitions) => Json(definitions).into_response(),
        Err(response) => response,
    }
}

pub async fn craftable_records(State(state): State<AppState>) -> Response {
    match run_lookup(&state, |service| service.craftable_records()).await {
        Ok(records) => Json(json!({ "records": records.as_ref() })).into_response(),
        Err(response) => response,
    }
}
