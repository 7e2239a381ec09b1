use std::{collections::HashMap, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::CancelFlag;

/// A classified weapon as stored in the autocomplete table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicItem {
    pub hash: u32,
    pub name: String,
    pub tier: String,
    pub r#type: String,
    pub icon_path: String,
    pub watermark_path: String,
    pub is_shelved: bool,
    pub damage_type: String,
    pub damage_icon_path: String,
}

/// A downloaded manifest archive ready to be extracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRelease {
    pub version: String,
    pub archive_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Queued,
    Unzip,
    Build,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncProgress {
    Unzip { decile: u8, bytes: u64 },
    Build { decile: u8 },
}

impl SyncProgress {
    pub fn stage(&self) -> SyncStage {
        match self {
            Self::Unzip { .. } => SyncStage::Unzip,
            Self::Build { .. } => SyncStage::Build,
        }
    }

    /// Overall completion in percent: extraction covers 0-36, the build 45-90.
    pub fn percent(&self) -> f64 {
        match self {
            Self::Unzip { decile, .. } => f64::from(*decile) * 4.0,
            Self::Build { decile } => 45.0 + f64::from(*decile) * 5.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub version: String,
    pub extracted: bool,
    pub rebuilt: bool,
    pub indexed_items: usize,
    pub successors_resolved: usize,
    pub craftable_records: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub version: String,
    pub archive_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJobResponse {
    pub job_id: String,
    pub status: JobState,
    pub stage: SyncStage,
    pub progress: f64,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub summary: Option<SyncSummary>,
    pub error: Option<ErrorPayload>,
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: JobState,
    pub stage: SyncStage,
    pub progress: f64,
    pub message: Option<String>,
    pub release: Option<ManifestRelease>,
    pub summary: Option<SyncSummary>,
    pub error: Option<ErrorPayload>,
    pub cancel: CancelFlag,
}

impl JobRecord {
    pub fn queued(job_id: String, release: ManifestRelease) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            created_at: now,
            updated_at: now,
            status: JobState::Queued,
            stage: SyncStage::Queued,
            progress: 0.0,
            message: Some("Queued for manifest sync".to_string()),
            release: Some(release),
            summary: None,
            error: None,
            cancel: CancelFlag::default(),
        }
    }

    pub fn to_response(&self) -> SyncJobResponse {
        SyncJobResponse {
            job_id: self.job_id.clone(),
            status: self.status,
            stage: self.stage,
            progress: self.progress,
            message: self.message.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            summary: self.summary.clone(),
            error: self.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<i64>,
}

impl SuggestQuery {
    /// Zero or a negative `limit` means no limit; a missing one falls back to `default`.
    pub fn effective_limit(&self, default: usize) -> usize {
        match self.limit {
            Some(limit) => usize::try_from(limit.max(0)).unwrap_or(usize::MAX),
            None => default,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveItemsRequest {
    pub hashes: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmblemRequest {
    /// Character id to the hash of the emblem it has equipped.
    pub emblems: HashMap<String, u32>,
}
