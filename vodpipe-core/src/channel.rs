use std::path::PathBuf;

use crate::config::{
    ChannelConfig, EnvKeysSection, LabelSection, VodpipeConfig, TITLES_FILE_NAME,
};
use crate::error::Result;
use crate::timecode::{format_clock_time, DateConvention};

/// Everything a stage needs to know about one channel, resolved from config.
#[derive(Debug, Clone)]
pub struct ChannelContext {
    pub name: String,
    pub recording_path: PathBuf,
    pub upload_path: PathBuf,
    pub cookies_path: Option<PathBuf>,
    pub divide_seconds: u64,
    pub convention: DateConvention,
    pub before: Option<i64>,
    pub after: Option<i64>,
    pub comment_titles: bool,
    pub download: bool,
    pub order_before_upload: bool,
    pub labels: Option<LabelSection>,
    pub env_keys: EnvKeysSection,
}

impl ChannelContext {
    pub fn from_config(config: &VodpipeConfig, channel: &ChannelConfig) -> Result<Self> {
        let convention = config.date_convention()?;
        let (before, after) = channel.scrape.window(&convention)?;
        Ok(Self {
            name: channel.name.clone(),
            recording_path: channel.recording_path(&config.paths),
            upload_path: channel.upload_path(&config.paths),
            cookies_path: channel.cookies_path(&config.paths),
            divide_seconds: channel.divide_seconds()?,
            convention,
            before,
            after,
            comment_titles: channel.scrape.comment_titles,
            download: channel.download,
            order_before_upload: channel.order_before_upload,
            labels: channel.labels.clone(),
            env_keys: channel.env_keys.clone(),
        })
    }

    /// Minimal context rooted at `recording_path`, for tests and ad-hoc runs.
    pub fn new(name: &str, recording_path: impl Into<PathBuf>, divide_seconds: u64) -> Self {
        let recording_path = recording_path.into();
        Self {
            name: name.to_string(),
            upload_path: recording_path.join(crate::config::UPLOAD_FOLDER_NAME),
            recording_path,
            cookies_path: None,
            divide_seconds,
            convention: DateConvention::utc(),
            before: None,
            after: None,
            comment_titles: true,
            download: true,
            order_before_upload: false,
            labels: None,
            env_keys: EnvKeysSection::default(),
        }
    }

    pub fn divide_time(&self) -> String {
        format_clock_time(self.divide_seconds)
    }

    pub fn titles_path(&self) -> PathBuf {
        self.recording_path.join(TITLES_FILE_NAME)
    }

    pub fn media_path(&self, stem: &str) -> PathBuf {
        self.recording_path.join(format!("{stem}.mp4"))
    }
}
