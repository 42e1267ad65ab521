use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vodpipe_core::discovery::DiscoveryReport;
use vodpipe_core::journal::JOURNAL_DB_FILE_NAME;
use vodpipe_core::{
    load_config, recent_failures, HelixSourceFactory, JsonVodStore, OrderReport, Pipeline,
    PipelineJournal, ProcessToolRunner, RunOptions, RunReport, Stage, StageReport, StoredFailure,
    VodStatus, VodpipeConfig,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] vodpipe_core::ConfigError),
    #[error(transparent)]
    Pipeline(#[from] vodpipe_core::PipelineError),
    #[error("state error: {0}")]
    Store(#[from] vodpipe_core::StoreError),
    #[error("journal error: {0}")]
    Journal(#[from] vodpipe_core::JournalError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("channel {0} is not configured")]
    UnknownChannel(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Archive and prepare stream recordings for upload", long_about = None)]
pub struct Cli {
    /// Path to vodpipe.toml
    #[arg(long, default_value = "configs/vodpipe.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover, download, fix up, split and order every channel
    Run(RunArgs),
    /// Refresh the recording list of each channel
    Discover(ChannelArgs),
    /// Download recordings that are not on disk yet
    Download(ChannelArgs),
    /// Remux downloaded recordings
    Fixup(ChannelArgs),
    /// Cut long recordings into parts
    Split(ChannelArgs),
    /// Move split parts into the upload folder in date order
    Order(ChannelArgs),
    /// Count recordings per lifecycle status
    Status(ChannelArgs),
    /// List the recordings tracked for a channel
    Vods(VodsArgs),
    /// Show the most recent journaled failures
    Errors(ErrorsArgs),
    /// Print shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Only process this channel
    #[arg(long)]
    pub channel: Option<String>,
    /// Work from the recordings already tracked
    #[arg(long)]
    pub skip_discovery: bool,
}

#[derive(Args, Debug, Default)]
pub struct ChannelArgs {
    /// Only process this channel
    #[arg(long)]
    pub channel: Option<String>,
}

#[derive(Args, Debug)]
pub struct VodsArgs {
    /// Channel whose records are listed
    pub channel: String,
    /// Filter by status, e.g. split or not_downloaded
    #[arg(long)]
    pub status: Option<VodStatus>,
}

#[derive(Args, Debug)]
pub struct ErrorsArgs {
    /// Number of failures shown
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Installs the fmt subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

pub async fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        let name = command.get_name().to_string();
        clap_complete::generate(args.shell, &mut command, name, &mut io::stdout());
        return Ok(());
    }

    let context = AppContext::new(&cli)?;
    match &cli.command {
        Commands::Run(args) => {
            let report = context.pipeline()?.run(&args.into()).await?;
            render(&report, cli.format)?;
        }
        Commands::Discover(args) => {
            let reports = context.pipeline()?.discover(args.channel.as_deref()).await?;
            render(&reports, cli.format)?;
        }
        Commands::Download(args) => context.stage(Stage::Download, args, cli.format).await?,
        Commands::Fixup(args) => context.stage(Stage::Fixup, args, cli.format).await?,
        Commands::Split(args) => context.stage(Stage::Split, args, cli.format).await?,
        Commands::Order(args) => {
            let reports = context.pipeline()?.order(args.channel.as_deref(), false)?;
            render(&reports, cli.format)?;
        }
        Commands::Status(args) => {
            let status = context.status(args.channel.as_deref())?;
            render(&status, cli.format)?;
        }
        Commands::Vods(args) => {
            let list = context.vods(args)?;
            render(&list, cli.format)?;
        }
        Commands::Errors(args) => {
            let list = context.errors(args)?;
            render(&list, cli.format)?;
        }
        Commands::Completions(_) => {}
    }
    Ok(())
}

impl From<&RunArgs> for RunOptions {
    fn from(args: &RunArgs) -> Self {
        RunOptions {
            channel: args.channel.clone(),
            skip_discovery: args.skip_discovery,
        }
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: VodpipeConfig,
    store: JsonVodStore,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config = load_config(&cli.config)?;
        debug!(
            config = %cli.config.display(),
            channels = config.channels.len(),
            "configuration loaded"
        );
        let store = JsonVodStore::new(&config.paths.data_dir)?;
        Ok(Self { config, store })
    }

    fn pipeline(&self) -> Result<Pipeline> {
        let journal = PipelineJournal::open_in(&self.config.paths.logs_dir)?;
        Ok(Pipeline::from_config(
            &self.config,
            Arc::new(HelixSourceFactory),
            Arc::new(ProcessToolRunner::new()),
            Arc::new(journal),
        )?)
    }

    async fn stage(&self, stage: Stage, args: &ChannelArgs, format: OutputFormat) -> Result<()> {
        let reports = self
            .pipeline()?
            .run_stage(stage, args.channel.as_deref())
            .await?;
        render(&reports, format)
    }

    fn channel_names(&self, filter: Option<&str>) -> Result<Vec<String>> {
        match filter {
            None => Ok(self
                .config
                .channels
                .iter()
                .map(|channel| channel.name.clone())
                .collect()),
            Some(name) => self
                .config
                .channel(name)
                .map(|channel| vec![channel.name.clone()])
                .ok_or_else(|| AppError::UnknownChannel(name.to_string())),
        }
    }

    fn status(&self, filter: Option<&str>) -> Result<StatusReport> {
        let mut channels = Vec::new();
        for name in self.channel_names(filter)? {
            let counts = self
                .store
                .status_counts(&name)?
                .into_iter()
                .map(|(status, count)| (status.as_str().to_string(), count))
                .collect();
            channels.push(ChannelStatus { name, counts });
        }
        Ok(StatusReport {
            generated_at: Utc::now(),
            channels,
        })
    }

    fn vods(&self, args: &VodsArgs) -> Result<VodList> {
        let name = self
            .channel_names(Some(&args.channel))?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::UnknownChannel(args.channel.clone()))?;
        let mut rows: Vec<VodEntry> = self
            .store
            .load(&name)?
            .into_iter()
            .filter(|(_, record)| args.status.map_or(true, |status| record.status == status))
            .map(|(vod_id, record)| VodEntry {
                vod_id,
                file_name: record.file_name,
                status: record.status.as_str().to_string(),
                duration: record.duration_str,
                parts: record.expected_splits.len().max(1),
                title: record.original_title,
            })
            .collect();
        rows.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(VodList {
            channel: name,
            rows,
        })
    }

    fn errors(&self, args: &ErrorsArgs) -> Result<ErrorList> {
        let db_path = self.config.paths.logs_dir.join(JOURNAL_DB_FILE_NAME);
        Ok(ErrorList {
            rows: recent_failures(&db_path, args.limit)?,
        })
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    generated_at: DateTime<Utc>,
    channels: Vec<ChannelStatus>,
}

#[derive(Debug, Serialize)]
struct ChannelStatus {
    name: String,
    counts: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
struct VodList {
    channel: String,
    rows: Vec<VodEntry>,
}

#[derive(Debug, Serialize)]
struct VodEntry {
    vod_id: String,
    file_name: String,
    status: String,
    duration: String,
    parts: usize,
    title: String,
}

#[derive(Debug, Serialize)]
struct ErrorList {
    rows: Vec<StoredFailure>,
}

impl DisplayFallback for StatusReport {
    fn display(&self) -> String {
        if self.channels.is_empty() {
            return "No channels configured".to_string();
        }
        let mut lines = Vec::new();
        for channel in &self.channels {
            lines.push(format!("{}:", channel.name));
            if channel.counts.is_empty() {
                lines.push("  (no recordings tracked)".to_string());
            }
            for (status, count) in &channel.counts {
                lines.push(format!("  - {status}: {count}"));
            }
        }
        lines.join("\n")
    }
}

impl DisplayFallback for VodList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return format!("No recordings tracked for {}", self.channel);
        }
        self.rows
            .iter()
            .map(|entry| {
                format!(
                    "{} | {} | {} | {} | parts={} | {}",
                    entry.vod_id,
                    entry.file_name,
                    entry.status,
                    entry.duration,
                    entry.parts,
                    entry.title
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for ErrorList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No failures recorded".to_string();
        }
        self.rows
            .iter()
            .map(|row| {
                format!(
                    "{} [{}/{}] {} vod={}: {}",
                    row.ts,
                    row.channel,
                    row.stage,
                    row.kind,
                    row.vod_id.as_deref().unwrap_or("-"),
                    row.message
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for Vec<DiscoveryReport> {
    fn display(&self) -> String {
        if self.is_empty() {
            return "Nothing discovered".to_string();
        }
        self.iter()
            .map(|report| {
                format!(
                    "{}: {} listed, {} new, {} retired, skipped {} live / {} non-archive / {} outside window",
                    report.channel,
                    report.seen,
                    report.added.len(),
                    report.retired.len(),
                    report.skipped_live,
                    report.skipped_type,
                    report.skipped_window
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for Vec<StageReport> {
    fn display(&self) -> String {
        if self.is_empty() {
            return "No channels processed".to_string();
        }
        self.iter()
            .map(|report| {
                let stage = report.stage.map(|stage| stage.as_str()).unwrap_or("-");
                format!(
                    "{} {}: {} advanced, {} skipped, {} requeues",
                    report.channel,
                    stage,
                    report.advanced.len(),
                    report.skipped.len(),
                    report.requeues
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for Vec<OrderReport> {
    fn display(&self) -> String {
        if self.is_empty() {
            return "Nothing to order".to_string();
        }
        let mut lines = Vec::new();
        for report in self {
            lines.push(format!(
                "{}: {} files moved across {} dates ({} positions kept)",
                report.channel,
                report.moved.len(),
                report.groups.len(),
                report.passive
            ));
            for moved in &report.moved {
                lines.push(format!("  {} -> {}", moved.from, moved.to));
            }
            for labelled in &report.labelled {
                lines.push(format!("  {} -> {}", labelled.from, labelled.to));
            }
        }
        lines.join("\n")
    }
}

impl DisplayFallback for RunReport {
    fn display(&self) -> String {
        let mut sections = Vec::new();
        if !self.discovery.is_empty() {
            sections.push(self.discovery.display());
        }
        sections.push(self.stages.display());
        sections.push(self.orders.display());
        sections.push(format!("{} failures journaled", self.failures));
        sections.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use vodpipe_core::{
        ExpectedSplit, FailureJournal, FailureKind, FailureRecord, VodMap, VodRecord,
    };

    fn record(file_name: &str, status: VodStatus, duration: u64) -> VodRecord {
        VodRecord {
            original_title: format!("Stream {file_name}"),
            url: "https://www.twitch.tv/videos/1".to_string(),
            unix_timestamp: 1_709_280_000,
            date_str: "2024-03-01".to_string(),
            file_name: file_name.to_string(),
            status,
            duration_str: format!("{duration}s"),
            duration,
            expected_splits: ExpectedSplit::plan(file_name, duration, 43_200),
        }
    }

    fn cli(config: &Path, command: Commands) -> Cli {
        Cli {
            config: config.to_path_buf(),
            format: OutputFormat::Json,
            verbose: false,
            command,
        }
    }

    fn prepare_test_context() -> Result<(TempDir, PathBuf, AppContext)> {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("vodpipe.toml");
        fs::write(
            &config_path,
            "[dates]\nutc_offset_minutes = 0\n\n[[channels]]\nname = \"alpha\"\n\n[[channels]]\nname = \"beta\"\n",
        )
        .unwrap();
        let context = AppContext::new(&cli(&config_path, Commands::Status(ChannelArgs::default())))?;

        let mut vods = VodMap::new();
        vods.insert("1".into(), record("2024-03-01_000", VodStatus::Split, 108_000));
        vods.insert("2".into(), record("2024-03-01_001", VodStatus::NotDownloaded, 3_600));
        vods.insert("3".into(), record("2024-02-28_000", VodStatus::Split, 3_600));
        context.store.save("alpha", &vods)?;
        Ok((temp, config_path, context))
    }

    #[test]
    fn config_paths_resolve_next_to_the_file() {
        let (temp, _, context) = prepare_test_context().unwrap();
        assert_eq!(context.config.paths.data_dir, temp.path().join("data"));
        assert!(temp.path().join("data/alpha.json").exists());
    }

    #[test]
    fn status_counts_records_per_channel() {
        let (_temp, _, context) = prepare_test_context().unwrap();
        let status = context.status(None).unwrap();
        assert_eq!(status.channels.len(), 2);
        assert_eq!(status.channels[0].counts["SPLIT"], 2);
        assert_eq!(status.channels[0].counts["NOT_DOWNLOADED"], 1);
        assert!(status.channels[1].counts.is_empty());
        assert!(status.display().contains("(no recordings tracked)"));
    }

    #[test]
    fn unknown_channel_is_an_error() {
        let (_temp, _, context) = prepare_test_context().unwrap();
        assert!(matches!(
            context.status(Some("gamma")),
            Err(AppError::UnknownChannel(name)) if name == "gamma"
        ));
    }

    #[test]
    fn vods_are_listed_by_file_name_and_filtered() {
        let (_temp, _, context) = prepare_test_context().unwrap();
        let all = context
            .vods(&VodsArgs {
                channel: "alpha".into(),
                status: None,
            })
            .unwrap();
        let names: Vec<&str> = all.rows.iter().map(|row| row.file_name.as_str()).collect();
        assert_eq!(names, vec!["2024-02-28_000", "2024-03-01_000", "2024-03-01_001"]);
        assert_eq!(all.rows[1].parts, 3);

        let split = context
            .vods(&VodsArgs {
                channel: "alpha".into(),
                status: Some(VodStatus::NotDownloaded),
            })
            .unwrap();
        assert_eq!(split.rows.len(), 1);
        assert_eq!(split.rows[0].vod_id, "2");
    }

    #[test]
    fn errors_read_back_from_the_journal() {
        let (_temp, _, context) = prepare_test_context().unwrap();
        let empty = context.errors(&ErrorsArgs { limit: 5 }).unwrap();
        assert!(empty.rows.is_empty());
        assert_eq!(empty.display(), "No failures recorded");

        let journal = PipelineJournal::open_in(&context.config.paths.logs_dir).unwrap();
        journal
            .record_failure(&FailureRecord::new(
                "alpha",
                Stage::Download,
                Some("2"),
                FailureKind::ContentUnavailable,
                "couldn't get 2".to_string(),
            ))
            .unwrap();
        let list = context.errors(&ErrorsArgs { limit: 5 }).unwrap();
        assert_eq!(list.rows.len(), 1);
        assert!(list.display().contains("[alpha/download] content_unavailable vod=2"));
    }

    #[test]
    fn json_output_serializes_reports() {
        let (_temp, _, context) = prepare_test_context().unwrap();
        let status = context.status(Some("alpha")).unwrap();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["channels"][0]["name"], "alpha");
        assert_eq!(json["channels"][0]["counts"]["SPLIT"], 2);
    }

    #[tokio::test]
    async fn order_command_moves_split_parts() {
        let (_temp, config_path, context) = prepare_test_context().unwrap();
        let recordings = context.config.paths.recording_dir.join("alpha");
        fs::create_dir_all(&recordings).unwrap();
        for stem in [
            "2024-03-01_000_000",
            "2024-03-01_000_001",
            "2024-03-01_000_002",
            "2024-02-28_000_000",
        ] {
            fs::write(recordings.join(format!("{stem}.mp4")), b"x").unwrap();
        }

        run(cli(
            &config_path,
            Commands::Order(ChannelArgs {
                channel: Some("alpha".into()),
            }),
        ))
        .await
        .unwrap();

        let upload = recordings.join("upload");
        assert!(upload.join("2024-02-28.mp4").exists());
        assert!(upload.join("2024-03-01_003.mp4").exists());
        let vods = context.store.load("alpha").unwrap();
        assert_eq!(vods["1"].status, VodStatus::Ordered);
        assert_eq!(vods["2"].status, VodStatus::NotDownloaded);
    }

    #[test]
    fn cli_parses_channel_and_status_filters() {
        let parsed = Cli::try_parse_from([
            "vodpipectl",
            "--format",
            "json",
            "vods",
            "alpha",
            "--status",
            "split",
        ])
        .unwrap();
        assert_eq!(parsed.format, OutputFormat::Json);
        match parsed.command {
            Commands::Vods(args) => {
                assert_eq!(args.channel, "alpha");
                assert_eq!(args.status, Some(VodStatus::Split));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let parsed = Cli::try_parse_from(["vodpipectl", "run", "--skip-discovery"]).unwrap();
        assert_eq!(parsed.config, PathBuf::from("configs/vodpipe.toml"));
        assert!(matches!(
            parsed.command,
            Commands::Run(RunArgs { skip_discovery: true, channel: None })
        ));
    }
}
