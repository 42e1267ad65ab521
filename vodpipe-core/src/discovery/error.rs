use std::path::PathBuf;

use thiserror::Error;

use crate::timecode::FormatError;
use crate::vod::StoreError;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("missing credential: environment variable {0} is not set")]
    Credential(String),
    #[error("{endpoint} answered {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unexpected response: {0}")]
    Response(String),
    #[error("recording {vod_id}: {source}")]
    Format {
        vod_id: String,
        source: FormatError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
