use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::channel::ChannelContext;
use crate::config::VodpipeConfig;
use crate::discovery::{Discoverer, DiscoveryError, DiscoveryReport, VodSourceFactory};
use crate::error::ConfigError;
use crate::journal::{FailureJournal, FailureKind, FailureRecord, JournalError};
use crate::ordering::{OrderError, OrderReport, OrderingEngine};
use crate::processor::{ProcessorError, Stage, StageReport, StageRunner, ToolRunner};
use crate::vod::{JsonVodStore, StoreError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error("failed to record failure: {0}")]
    Journal(#[from] JournalError),
    #[error("channel {0} is not configured")]
    UnknownChannel(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub channel: Option<String>,
    pub skip_discovery: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub discovery: Vec<DiscoveryReport>,
    pub stages: Vec<StageReport>,
    pub orders: Vec<OrderReport>,
    pub failures: usize,
}

/// Runs the stages for every configured channel, one channel at a time.
pub struct Pipeline {
    channels: Vec<ChannelContext>,
    discoverer: Discoverer,
    stages: StageRunner,
    ordering: OrderingEngine,
    journal: Arc<dyn FailureJournal>,
    failures: AtomicUsize,
}

impl Pipeline {
    pub fn new(
        channels: Vec<ChannelContext>,
        discoverer: Discoverer,
        stages: StageRunner,
        ordering: OrderingEngine,
        journal: Arc<dyn FailureJournal>,
    ) -> Self {
        Self {
            channels,
            discoverer,
            stages,
            ordering,
            journal,
            failures: AtomicUsize::new(0),
        }
    }

    pub fn from_config(
        config: &VodpipeConfig,
        sources: Arc<dyn VodSourceFactory>,
        runner: Arc<dyn ToolRunner>,
        journal: Arc<dyn FailureJournal>,
    ) -> PipelineResult<Self> {
        let store = JsonVodStore::new(&config.paths.data_dir)?;
        let channels = config
            .channels
            .iter()
            .map(|channel| ChannelContext::from_config(config, channel))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(
            channels,
            Discoverer::new(store.clone(), sources),
            StageRunner::new(
                store.clone(),
                runner,
                Arc::clone(&journal),
                config.tools.clone(),
            ),
            OrderingEngine::new(store),
            journal,
        ))
    }

    pub fn channels(&self) -> &[ChannelContext] {
        &self.channels
    }

    fn select(&self, filter: Option<&str>) -> PipelineResult<Vec<&ChannelContext>> {
        match filter {
            None => Ok(self.channels.iter().collect()),
            Some(name) => self
                .channels
                .iter()
                .find(|channel| channel.name == name)
                .map(|channel| vec![channel])
                .ok_or_else(|| PipelineError::UnknownChannel(name.to_string())),
        }
    }

    fn journal_failure(
        &self,
        channel: &ChannelContext,
        stage: Stage,
        kind: FailureKind,
        message: String,
    ) -> PipelineResult<()> {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.journal
            .record_failure(&FailureRecord::new(&channel.name, stage, None, kind, message))?;
        Ok(())
    }

    /// Discovery for each selected channel. A failing channel is journaled
    /// and skipped.
    pub async fn discover(&self, filter: Option<&str>) -> PipelineResult<Vec<DiscoveryReport>> {
        let mut reports = Vec::new();
        for channel in self.select(filter)? {
            match self.discoverer.discover(channel).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    warn!(channel = %channel.name, error = %err, "discovery failed, skipping channel");
                    self.journal_failure(
                        channel,
                        Stage::Discover,
                        discovery_kind(&err),
                        err.to_string(),
                    )?;
                }
            }
        }
        Ok(reports)
    }

    /// One tool stage for each selected channel that downloads. Unrecognized
    /// tool failures stop everything; other failures skip the channel.
    pub async fn run_stage(
        &self,
        stage: Stage,
        filter: Option<&str>,
    ) -> PipelineResult<Vec<StageReport>> {
        let mut reports = Vec::new();
        for channel in self.select(filter)? {
            if !channel.download {
                info!(channel = %channel.name, stage = %stage, "downloads disabled, skipping");
                continue;
            }
            let outcome = match stage {
                Stage::Download => self.stages.download(channel).await,
                Stage::Fixup => self.stages.fixup(channel).await,
                Stage::Split => self.stages.split(channel).await,
                Stage::Discover | Stage::Order => continue,
            };
            match outcome {
                Ok(report) => reports.push(report),
                Err(err @ ProcessorError::UnknownTool { .. }) => {
                    self.journal_failure(channel, stage, FailureKind::UnknownTool, err.to_string())?;
                    return Err(err.into());
                }
                Err(ProcessorError::Journal(err)) => return Err(err.into()),
                Err(err) => {
                    warn!(channel = %channel.name, stage = %stage, error = %err, "stage failed, skipping channel");
                    self.journal_failure(channel, stage, processor_kind(&err), err.to_string())?;
                }
            }
        }
        Ok(reports)
    }

    /// Ordering for each selected channel. With `opted_in_only`, channels
    /// without `order_before_upload` are left alone.
    pub fn order(&self, filter: Option<&str>, opted_in_only: bool) -> PipelineResult<Vec<OrderReport>> {
        let mut reports = Vec::new();
        for channel in self.select(filter)? {
            if !channel.download || (opted_in_only && !channel.order_before_upload) {
                continue;
            }
            match self.ordering.order_and_label(channel) {
                Ok(report) => reports.push(report),
                Err(err) => {
                    warn!(channel = %channel.name, error = %err, "ordering aborted for channel");
                    let kind = match err {
                        OrderError::Consistency { .. } => FailureKind::Consistency,
                        OrderError::Store(StoreError::Serde { .. }) => FailureKind::Format,
                        _ => FailureKind::Io,
                    };
                    self.journal_failure(channel, Stage::Order, kind, err.to_string())?;
                }
            }
        }
        Ok(reports)
    }

    /// Full run: each stage across all channels before the next stage.
    pub async fn run(&self, options: &RunOptions) -> PipelineResult<RunReport> {
        let filter = options.channel.as_deref();
        let failures_before = self.failures.load(Ordering::Relaxed);
        let mut report = RunReport::default();
        if !options.skip_discovery {
            report.discovery = self.discover(filter).await?;
        }
        for stage in [Stage::Download, Stage::Fixup, Stage::Split] {
            report.stages.extend(self.run_stage(stage, filter).await?);
        }
        report.orders = self.order(filter, true)?;
        report.failures = self.failures.load(Ordering::Relaxed) - failures_before;
        info!(failures = report.failures, "run finished");
        Ok(report)
    }
}

fn discovery_kind(err: &DiscoveryError) -> FailureKind {
    match err {
        DiscoveryError::Credential(_) => FailureKind::Credential,
        DiscoveryError::Api { .. } | DiscoveryError::Http(_) | DiscoveryError::Response(_) => {
            FailureKind::Api
        }
        DiscoveryError::Format { .. } | DiscoveryError::Url(_) => FailureKind::Format,
        DiscoveryError::Store(_) | DiscoveryError::Io { .. } => FailureKind::Io,
    }
}

fn processor_kind(err: &ProcessorError) -> FailureKind {
    match err {
        ProcessorError::UnknownTool { .. } => FailureKind::UnknownTool,
        ProcessorError::RequeueLimit { .. } => FailureKind::RequeueLimit,
        ProcessorError::Template(_) => FailureKind::Format,
        ProcessorError::Io { .. } | ProcessorError::Launch { .. } | ProcessorError::Store(_) => {
            FailureKind::Io
        }
        ProcessorError::Journal(_) => FailureKind::Unexpected,
    }
}
