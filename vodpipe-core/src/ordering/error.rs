use std::path::PathBuf;

use thiserror::Error;

use crate::vod::StoreError;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("parts of {vod_id} on disk do not match its split plan: expected {expected:?}, found {found:?}")]
    Consistency {
        vod_id: String,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("refusing to overwrite existing upload file {path}")]
    TargetExists { path: PathBuf },
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to scan {path}: {source}")]
    Scan {
        source: walkdir::Error,
        path: PathBuf,
    },
    #[error("invalid part pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type OrderResult<T> = Result<T, OrderError>;
