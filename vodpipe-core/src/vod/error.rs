use std::path::PathBuf;

use thiserror::Error;

use super::models::VodStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("malformed state file {path}: {source}")]
    Serde {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("failed to replace state file {path}: {source}")]
    Persist {
        source: tempfile::PersistError,
        path: PathBuf,
    },
    #[error("vod {vod_id} cannot move from {from} to {to}")]
    InvalidTransition {
        vod_id: String,
        from: VodStatus,
        to: VodStatus,
    },
    #[error("vod {vod_id} not found")]
    NotFound { vod_id: String },
    #[error("state store directory not configured")]
    MissingStore,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
