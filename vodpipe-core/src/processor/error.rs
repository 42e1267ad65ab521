use std::path::PathBuf;

use thiserror::Error;

use crate::journal::JournalError;
use crate::vod::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown placeholder {{{placeholder}}}")]
    UnknownPlaceholder { placeholder: String },
    #[error("placeholder {{{placeholder}}} expands to several arguments and must stand alone")]
    ListNotStandalone { placeholder: String },
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("{stage} of {vod_id} failed with unrecognized error (exit {exit_code:?}): {stderr}")]
    UnknownTool {
        stage: String,
        vod_id: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("{stage} of {vod_id} gave up after {requeues} requeues")]
    RequeueLimit {
        stage: String,
        vod_id: String,
        requeues: u32,
    },
    #[error("command template error: {0}")]
    Template(#[from] TemplateError),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Journal(#[from] JournalError),
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;
