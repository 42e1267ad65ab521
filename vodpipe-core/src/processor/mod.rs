mod classify;
mod command;
mod error;
mod runner;
mod types;

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tracing::{info, warn};

use crate::channel::ChannelContext;
use crate::config::ToolsSection;
use crate::journal::{FailureJournal, FailureKind, FailureRecord, RequeueRecord};
use crate::vod::{JsonVodStore, VodRecord};

pub use classify::{classify, ToolOutcome, TransientSignature};
pub use command::{CommandTemplate, TemplateContext};
pub use error::{ProcessorError, ProcessorResult, TemplateError};
pub use runner::{ProcessToolRunner, ToolRunner};
pub use types::{RetryPolicy, Stage, StageReport, ToolCommand, ToolOutput};

pub const FIXUP_SUFFIX: &str = "_fixed";

enum Execution {
    Completed,
    Skipped,
}

/// Drives the download, fixup and split stages for one channel at a time.
#[derive(Clone)]
pub struct StageRunner {
    store: JsonVodStore,
    runner: Arc<dyn ToolRunner>,
    journal: Arc<dyn FailureJournal>,
    tools: Arc<ToolsSection>,
    retry: RetryPolicy,
}

impl StageRunner {
    pub fn new(
        store: JsonVodStore,
        runner: Arc<dyn ToolRunner>,
        journal: Arc<dyn FailureJournal>,
        tools: ToolsSection,
    ) -> Self {
        let retry = RetryPolicy {
            max_requeues: tools.max_requeues,
        };
        Self {
            store,
            runner,
            journal,
            tools: Arc::new(tools),
            retry,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &JsonVodStore {
        &self.store
    }

    pub async fn download(&self, channel: &ChannelContext) -> ProcessorResult<StageReport> {
        self.ensure_recording_dir(channel).await?;
        let cookies_args = match &channel.cookies_path {
            Some(path) => vec![
                self.tools.cookies_flag.clone(),
                path.to_string_lossy().into_owned(),
            ],
            None => Vec::new(),
        };
        self.run_stage(channel, Stage::Download, |_, record| {
            let context = TemplateContext::new()
                .with("file_name", record.file_name.as_str())
                .with("vod_url", record.url.as_str())
                .with_list("cookies_args", cookies_args.clone());
            Ok(Some(self.tools.download.render(&context)?))
        })
        .await
    }

    pub async fn fixup(&self, channel: &ChannelContext) -> ProcessorResult<StageReport> {
        self.run_stage(channel, Stage::Fixup, |_, record| {
            let context = TemplateContext::new()
                .with("file_name", record.file_name.as_str())
                .with("temp_file_name", fixed_name(&record.file_name));
            Ok(Some(self.tools.fixup.render(&context)?))
        })
        .await
    }

    pub async fn split(&self, channel: &ChannelContext) -> ProcessorResult<StageReport> {
        let segment_time = channel.divide_time();
        self.run_stage(channel, Stage::Split, |_, record| {
            if !record.should_split() {
                return Ok(None);
            }
            let context = TemplateContext::new()
                .with("input_file_name", fixed_name(&record.file_name))
                .with("output_file_name", record.file_name.as_str())
                .with("segment_time", segment_time.as_str());
            Ok(Some(self.tools.split.render(&context)?))
        })
        .await
    }

    async fn run_stage<F>(
        &self,
        channel: &ChannelContext,
        stage: Stage,
        build: F,
    ) -> ProcessorResult<StageReport>
    where
        F: Fn(&str, &VodRecord) -> ProcessorResult<Option<ToolCommand>>,
    {
        let (Some(input), Some(output)) = (stage.input_status(), stage.output_status()) else {
            return Ok(StageReport::new(&channel.name, stage));
        };
        let mut vods = self.store.load(&channel.name)?;
        let pending: Vec<(String, VodRecord)> = vods
            .iter()
            .filter(|(_, record)| record.status == input)
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();
        let mut report = StageReport::new(&channel.name, stage);
        info!(channel = %channel.name, stage = %stage, pending = pending.len(), "stage started");

        for (index, (vod_id, record)) in pending.iter().enumerate() {
            info!(
                channel = %channel.name,
                stage = %stage,
                vod_id = %vod_id,
                file_name = %record.file_name,
                "processing {}/{}",
                index + 1,
                pending.len()
            );
            if self.already_completed(channel, stage, record).await {
                info!(
                    channel = %channel.name,
                    stage = %stage,
                    vod_id = %vod_id,
                    "files show the step already ran, recording status only"
                );
                self.store
                    .advance(&channel.name, &mut vods, vod_id, output)?;
                report.advanced.push(vod_id.clone());
                continue;
            }
            if let Some(command) = build(vod_id, record)? {
                let execution = self
                    .execute(channel, stage, vod_id, record, &command, &mut report)
                    .await?;
                if let Execution::Skipped = execution {
                    report.skipped.push(vod_id.clone());
                    continue;
                }
            }
            self.finish(channel, stage, record).await?;
            self.store
                .advance(&channel.name, &mut vods, vod_id, output)?;
            report.advanced.push(vod_id.clone());
        }
        info!(
            channel = %channel.name,
            stage = %stage,
            advanced = report.advanced.len(),
            skipped = report.skipped.len(),
            requeues = report.requeues,
            "stage finished"
        );
        Ok(report)
    }

    /// Runs `command` until it succeeds, is skipped, or fails for good.
    async fn execute(
        &self,
        channel: &ChannelContext,
        stage: Stage,
        vod_id: &str,
        record: &VodRecord,
        command: &ToolCommand,
        report: &mut StageReport,
    ) -> ProcessorResult<Execution> {
        let mut requeues = 0u32;
        loop {
            info!(command = %command, "running tool");
            let output = self.runner.run(command, &channel.recording_path).await?;
            match classify(&output, &record.file_name) {
                ToolOutcome::Success => return Ok(Execution::Completed),
                ToolOutcome::Transient(signature) => {
                    if !self.retry.allows(requeues) {
                        return Err(ProcessorError::RequeueLimit {
                            stage: stage.to_string(),
                            vod_id: vod_id.to_string(),
                            requeues,
                        });
                    }
                    requeues += 1;
                    report.requeues += 1;
                    self.journal.record_requeue(&RequeueRecord {
                        timestamp: Utc::now(),
                        channel: channel.name.clone(),
                        stage,
                        vod_id: vod_id.to_string(),
                        signature: signature.as_str().to_string(),
                        attempt: requeues,
                    })?;
                }
                ToolOutcome::ContentUnavailable => {
                    self.journal.record_failure(&FailureRecord::new(
                        &channel.name,
                        stage,
                        Some(vod_id),
                        FailureKind::ContentUnavailable,
                        format!("couldn't get {vod_id}, recently deleted? {}", output.stderr.trim()),
                    ))?;
                    return Ok(Execution::Skipped);
                }
                ToolOutcome::Unknown => {
                    return Err(ProcessorError::UnknownTool {
                        stage: stage.to_string(),
                        vod_id: vod_id.to_string(),
                        exit_code: output.exit_code,
                        stderr: output.stderr.trim().to_string(),
                    });
                }
            }
        }
    }

    /// True when the step's input is gone and its outputs are on disk, which
    /// is what an interruption between `finish` and the status save leaves.
    async fn already_completed(
        &self,
        channel: &ChannelContext,
        stage: Stage,
        record: &VodRecord,
    ) -> bool {
        let input = match stage {
            Stage::Fixup => channel.media_path(&record.file_name),
            Stage::Split => channel.media_path(&fixed_name(&record.file_name)),
            _ => return false,
        };
        if media_exists(&input).await {
            return false;
        }
        let outputs = match stage {
            Stage::Fixup => vec![fixed_name(&record.file_name)],
            _ => record.part_names(),
        };
        for stem in &outputs {
            if !media_exists(&channel.media_path(stem)).await {
                return false;
            }
        }
        true
    }

    /// File bookkeeping after a successful stage step.
    async fn finish(
        &self,
        channel: &ChannelContext,
        stage: Stage,
        record: &VodRecord,
    ) -> ProcessorResult<()> {
        match stage {
            Stage::Fixup => remove_file(&channel.media_path(&record.file_name)).await,
            Stage::Split => {
                let fixed = channel.media_path(&fixed_name(&record.file_name));
                if record.should_split() {
                    remove_file(&fixed).await
                } else {
                    let target = channel.media_path(&format!("{}_000", record.file_name));
                    fs::rename(&fixed, &target)
                        .await
                        .map_err(|source| ProcessorError::Io {
                            source,
                            path: fixed.clone(),
                        })
                }
            }
            _ => Ok(()),
        }
    }

    async fn ensure_recording_dir(&self, channel: &ChannelContext) -> ProcessorResult<()> {
        fs::create_dir_all(&channel.recording_path)
            .await
            .map_err(|source| ProcessorError::Io {
                source,
                path: channel.recording_path.clone(),
            })
    }
}

pub fn fixed_name(file_name: &str) -> String {
    format!("{file_name}{FIXUP_SUFFIX}")
}

async fn media_exists(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

async fn remove_file(path: &Path) -> ProcessorResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "expected file already gone");
            Ok(())
        }
        Err(source) => Err(ProcessorError::Io {
            source,
            path: path.to_path_buf(),
        }),
    }
}
