pub mod channel;
pub mod config;
pub mod discovery;
pub mod error;
pub mod journal;
pub mod ordering;
pub mod pipeline;
pub mod processor;
pub mod timecode;
pub mod vod;

pub use channel::ChannelContext;
pub use config::{
    load_config, ChannelConfig, EnvKeysSection, LabelSection, PathsSection, ScrapeSection,
    ToolsSection, VodpipeConfig,
};
pub use discovery::{
    merge_discovered, render_titles, Discoverer, DiscoveryError, DiscoveryReport,
    DiscoveryResult, HelixClient, HelixCredentials, HelixSourceFactory, RawRecording, VodSource,
    VodSourceFactory,
};
pub use error::{ConfigError, Result};
pub use journal::{
    recent_failures, FailureJournal, FailureKind, FailureRecord, JournalError, JournalResult,
    MemoryJournal, PipelineJournal, RequeueRecord, StoredFailure,
};
pub use ordering::{
    apply_labels, plan_order, DateGroup, OrderError, OrderReport, OrderResult, OrderingEngine,
};
pub use pipeline::{Pipeline, PipelineError, PipelineResult, RunOptions, RunReport};
pub use processor::{
    CommandTemplate, ProcessToolRunner, ProcessorError, ProcessorResult, RetryPolicy, Stage,
    StageReport, StageRunner, ToolCommand, ToolOutput, ToolRunner,
};
pub use timecode::{
    format_clock_time, parse_clock_duration, parse_clock_time, parse_timestamp, DateConvention,
    FormatError,
};
pub use vod::{
    ExpectedSplit, JsonVodStore, JsonVodStoreBuilder, StoreError, StoreResult, VodMap, VodRecord,
    VodStatus,
};
