use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use tokio::{sync::mpsc, time};
use tracing::{error, info, warn};

use crate::{
    error::ManifestError,
    models::{ErrorPayload, JobRecord, JobState, SyncProgress, SyncStage, SyncSummary},
    AppState,
};

// Progress events beyond this backlog are dropped rather than stalling the scan.
const PROGRESS_BACKLOG: usize = 32;

pub fn spawn_sync_worker(state: AppState, mut queue_rx: mpsc::Receiver<String>) {
    tokio::spawn(async move {
        while let Some(job_id) = queue_rx.recv().await {
            info!(job_id = %job_id, "Worker picked manifest sync job");
            if let Err(err) = process_sync_job(state.clone(), &job_id).await {
                error!("Manifest sync job {job_id} failed: {err:#}");
                let code = err
                    .downcast_ref::<ManifestError>()
                    .map(error_code)
                    .unwrap_or("SYNC_FAILED");
                let mut jobs = state.jobs.write().await;
                if let Some(job) = jobs.get_mut(&job_id) {
                    if matches!(job.status, JobState::Canceled) {
                        continue;
                    }
                    job.status = JobState::Failed;
                    job.updated_at = Utc::now();
                    job.error = Some(ErrorPayload {
                        code: code.to_string(),
                        message: format!("{err:#}"),
                    });
                    job.message = Some("Manifest sync failed".to_string());
                    job.release = None;
                }
            }
        }
    });
}

pub fn spawn_cleanup_worker(state: AppState) {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let evicted = evict_finished_jobs(&state).await;
            if evicted > 0 {
                info!(evicted, "Evicted finished sync jobs");
            }
        }
    });
}

pub fn error_code(err: &ManifestError) -> &'static str {
    match err {
        ManifestError::MissingTable(_) => "MISSING_TABLE",
        ManifestError::EmptySourceTable(_) => "EMPTY_SOURCE_TABLE",
        ManifestError::NoItemsClassified => "NO_ITEMS_CLASSIFIED",
        ManifestError::MalformedRecord(_) => "MALFORMED_RECORD",
        ManifestError::ManifestUnavailable(_) => "MANIFEST_UNAVAILABLE",
        ManifestError::Archive(_) => "ARCHIVE_ERROR",
        ManifestError::Cancelled => "CANCELLED",
        ManifestError::Io(_) => "IO_ERROR",
        ManifestError::Sqlite(_) => "STORE_ERROR",
    }
}

async fn process_sync_job(state: AppState, job_id: &str) -> Result<()> {
    let (release, cancel) = {
        let mut jobs = state.jobs.write().await;
        let Some(job) = jobs.get_mut(job_id) else {
            anyhow::bail!("Unknown job id: {job_id}");
        };

        if matches!(job.status, JobState::Canceled) {
            info!("Skipping canceled job {job_id}");
            return Ok(());
        }

        job.status = JobState::Running;
        job.message = Some("Checking manifest".to_string());
        job.updated_at = Utc::now();
        job.error = None;

        (
            job.release.clone().context("Missing release payload")?,
            job.cancel.clone(),
        )
    };

    info!(
        job_id = %job_id,
        version = %release.version,
        archive = %release.archive_path.display(),
        "Manifest sync started"
    );

    let (progress_tx, mut progress_rx) = mpsc::channel::<SyncProgress>(PROGRESS_BACKLOG);
    let forward_state = state.clone();
    let forward_job_id = job_id.to_string();
    let forwarder = tokio::spawn(async move {
        while let Some(progress) = progress_rx.recv().await {
            let mut jobs = forward_state.jobs.write().await;
            if let Some(job) = jobs.get_mut(&forward_job_id) {
                if matches!(job.status, JobState::Canceled) {
                    continue;
                }
                job.stage = progress.stage();
                job.progress = progress.percent();
                job.message = Some(match progress {
                    SyncProgress::Unzip { bytes, .. } => format!("Extracted {bytes} bytes"),
                    SyncProgress::Build { decile } => format!("Indexed {}% of items", decile * 10),
                });
                job.updated_at = Utc::now();
            }
        }
    });

    let service = state.service.clone();
    let summary = tokio::task::spawn_blocking(move || {
        service.sync(
            &release,
            |progress| {
                let _ = progress_tx.try_send(progress);
            },
            &cancel,
        )
    })
    .await
    .context("Manifest sync task panicked")?;

    if let Err(err) = forwarder.await {
        warn!(job_id = %job_id, "Progress forwarder join error: {err:#}");
    }
    let summary = summary?;

    let mut jobs = state.jobs.write().await;
    if let Some(job) = jobs.get_mut(job_id) {
        if !finish_job(job, summary) {
            info!(job_id = %job_id, "Manifest sync finished after cancel, keeping canceled state");
            return Ok(());
        }
    }

    info!(job_id = %job_id, "Manifest sync job completed");
    Ok(())
}

/// Marks `job` completed unless it was canceled while the sync was running.
fn finish_job(job: &mut JobRecord, summary: SyncSummary) -> bool {
    if matches!(job.status, JobState::Canceled) {
        return false;
    }
    job.status = JobState::Completed;
    job.stage = SyncStage::Done;
    job.progress = 100.0;
    job.message = Some(if summary.rebuilt {
        format!("Indexed {} items", summary.indexed_items)
    } else {
        "Manifest already indexed".to_string()
    });
    job.updated_at = Utc::now();
    job.summary = Some(summary);
    job.release = None;
    job.error = None;
    true
}

async fn evict_finished_jobs(state: &AppState) -> usize {
    let cutoff =
        Utc::now() - ChronoDuration::seconds(state.config.job_retention_seconds as i64);
    let mut jobs = state.jobs.write().await;
    let before = jobs.len();
    jobs.retain(|_, job| !(job.status.is_finished() && job.updated_at < cutoff));
    before - jobs.len()
}
