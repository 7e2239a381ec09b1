use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ManifestError>;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest table {0} is missing")]
    MissingTable(String),
    #[error("manifest table {0} has no rows")]
    EmptySourceTable(String),
    #[error("no items survived classification")]
    NoItemsClassified,
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    #[error("manifest database has not been extracted yet: {}", .0.display())]
    ManifestUnavailable(PathBuf),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl ManifestError {
    /// Failures that abort a whole build because the manifest itself looks wrong.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::MissingTable(_) | Self::EmptySourceTable(_) | Self::NoItemsClassified
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Archive(_) | Self::Sqlite(_))
    }
}

impl From<zip::result::ZipError> for ManifestError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => Self::Io(io),
            other => Self::Archive(other.to_string()),
        }
    }
}
