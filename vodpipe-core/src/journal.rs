use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::processor::Stage;

pub const ERROR_LOG_FILE_NAME: &str = "errors.log";
pub const JOURNAL_DB_FILE_NAME: &str = "journal.sqlite";

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("journal database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("journal serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("journal log lock poisoned")]
    Poisoned,
}

pub type JournalResult<T> = std::result::Result<T, JournalError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ContentUnavailable,
    UnknownTool,
    RequeueLimit,
    Consistency,
    Credential,
    Api,
    Format,
    Io,
    Unexpected,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ContentUnavailable => "content_unavailable",
            FailureKind::UnknownTool => "unknown_tool",
            FailureKind::RequeueLimit => "requeue_limit",
            FailureKind::Consistency => "consistency",
            FailureKind::Credential => "credential",
            FailureKind::Api => "api",
            FailureKind::Format => "format",
            FailureKind::Io => "io",
            FailureKind::Unexpected => "unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub timestamp: DateTime<Utc>,
    pub channel: String,
    pub stage: Stage,
    pub vod_id: Option<String>,
    pub kind: FailureKind,
    pub message: String,
}

impl FailureRecord {
    pub fn new(
        channel: &str,
        stage: Stage,
        vod_id: Option<&str>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            channel: channel.to_string(),
            stage,
            vod_id: vod_id.map(str::to_string),
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RequeueRecord {
    pub timestamp: DateTime<Utc>,
    pub channel: String,
    pub stage: Stage,
    pub vod_id: String,
    /// Which transient signature matched.
    pub signature: String,
    pub attempt: u32,
}

/// Row read back from `pipeline_failures`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFailure {
    pub ts: String,
    pub channel: String,
    pub stage: String,
    pub vod_id: Option<String>,
    pub kind: String,
    pub message: String,
}

/// Durable sink for pipeline failures and transient requeues.
pub trait FailureJournal: Send + Sync {
    fn record_failure(&self, failure: &FailureRecord) -> JournalResult<()>;
    fn record_requeue(&self, requeue: &RequeueRecord) -> JournalResult<()>;
}

/// Appends JSON lines to `errors.log` and mirrors them into `journal.sqlite`.
#[derive(Debug)]
pub struct PipelineJournal {
    log: Mutex<File>,
    log_path: PathBuf,
    db_path: PathBuf,
    flags: OpenFlags,
}

impl PipelineJournal {
    pub fn open_in(logs_dir: impl AsRef<Path>) -> JournalResult<Self> {
        let dir = logs_dir.as_ref();
        Self::new(dir.join(ERROR_LOG_FILE_NAME), dir.join(JOURNAL_DB_FILE_NAME))
    }

    pub fn new(log_path: impl AsRef<Path>, db_path: impl AsRef<Path>) -> JournalResult<Self> {
        let log_path = log_path.as_ref().to_path_buf();
        let db_path = db_path.as_ref().to_path_buf();
        for parent in [log_path.parent(), db_path.parent()].into_iter().flatten() {
            create_dir_all(parent).map_err(|source| JournalError::Io {
                source,
                path: parent.to_path_buf(),
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|source| JournalError::Io {
                source,
                path: log_path.clone(),
            })?;
        let journal = Self {
            log: Mutex::new(file),
            log_path,
            db_path,
            flags: OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        };
        journal.initialize_db()?;
        Ok(journal)
    }

    fn initialize_db(&self) -> JournalResult<()> {
        let conn = self.open_db()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS pipeline_failures (
                ts TEXT NOT NULL,
                channel TEXT NOT NULL,
                stage TEXT NOT NULL,
                vod_id TEXT,
                kind TEXT NOT NULL,
                message TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pipeline_failures_ts ON pipeline_failures(ts DESC);
            CREATE TABLE IF NOT EXISTS stage_requeues (
                ts TEXT NOT NULL,
                channel TEXT NOT NULL,
                stage TEXT NOT NULL,
                vod_id TEXT NOT NULL,
                signature TEXT NOT NULL,
                attempt INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_stage_requeues_ts ON stage_requeues(ts DESC);",
        )?;
        Ok(())
    }

    fn open_db(&self) -> JournalResult<Connection> {
        let conn = Connection::open_with_flags(&self.db_path, self.flags)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(conn)
    }

    fn append_line<T: Serialize>(&self, entry: &T) -> JournalResult<()> {
        let json = serde_json::to_string(entry)?;
        let mut guard = self.log.lock().map_err(|_| JournalError::Poisoned)?;
        writeln!(guard, "{json}")
            .and_then(|_| guard.flush())
            .map_err(|source| JournalError::Io {
                source,
                path: self.log_path.clone(),
            })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }
}

impl FailureJournal for PipelineJournal {
    fn record_failure(&self, failure: &FailureRecord) -> JournalResult<()> {
        error!(
            channel = %failure.channel,
            stage = %failure.stage,
            vod_id = failure.vod_id.as_deref().unwrap_or("-"),
            kind = failure.kind.as_str(),
            "{}",
            failure.message
        );
        self.append_line(failure)?;
        let conn = self.open_db()?;
        conn.execute(
            "INSERT INTO pipeline_failures (ts, channel, stage, vod_id, kind, message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                failure.timestamp.to_rfc3339(),
                failure.channel,
                failure.stage.as_str(),
                failure.vod_id,
                failure.kind.as_str(),
                failure.message,
            ],
        )?;
        Ok(())
    }

    fn record_requeue(&self, requeue: &RequeueRecord) -> JournalResult<()> {
        warn!(
            channel = %requeue.channel,
            stage = %requeue.stage,
            vod_id = %requeue.vod_id,
            signature = %requeue.signature,
            attempt = requeue.attempt,
            "requeueing after transient tool failure"
        );
        self.append_line(requeue)?;
        let conn = self.open_db()?;
        conn.execute(
            "INSERT INTO stage_requeues (ts, channel, stage, vod_id, signature, attempt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                requeue.timestamp.to_rfc3339(),
                requeue.channel,
                requeue.stage.as_str(),
                requeue.vod_id,
                requeue.signature,
                requeue.attempt as i64,
            ],
        )?;
        Ok(())
    }
}

/// Most recent failures first. A missing database reads as empty.
pub fn recent_failures(db_path: &Path, limit: usize) -> JournalResult<Vec<StoredFailure>> {
    if !db_path.exists() {
        return Ok(Vec::new());
    }
    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let mut stmt = conn.prepare(
        "SELECT ts, channel, stage, vod_id, kind, message
         FROM pipeline_failures ORDER BY ts DESC, rowid DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok(StoredFailure {
            ts: row.get(0)?,
            channel: row.get(1)?,
            stage: row.get(2)?,
            vod_id: row.get(3)?,
            kind: row.get(4)?,
            message: row.get(5)?,
        })
    })?;
    let mut failures = Vec::new();
    for row in rows {
        failures.push(row?);
    }
    Ok(failures)
}

/// In-memory journal for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    failures: Mutex<Vec<FailureRecord>>,
    requeues: Mutex<Vec<RequeueRecord>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<FailureRecord> {
        self.failures
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn requeues(&self) -> Vec<RequeueRecord> {
        self.requeues
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl FailureJournal for MemoryJournal {
    fn record_failure(&self, failure: &FailureRecord) -> JournalResult<()> {
        self.failures
            .lock()
            .map_err(|_| JournalError::Poisoned)?
            .push(failure.clone());
        Ok(())
    }

    fn record_requeue(&self, requeue: &RequeueRecord) -> JournalResult<()> {
        self.requeues
            .lock()
            .map_err(|_| JournalError::Poisoned)?
            .push(requeue.clone());
        Ok(())
    }
}
