use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::ordering::PART_TOKEN;
use crate::processor::CommandTemplate;
use crate::timecode::{parse_clock_time, DateConvention};

pub const DEFAULT_DIVIDE_TIME: &str = "11:59:57";
pub const UPLOAD_FOLDER_NAME: &str = "upload";
pub const TITLES_FILE_NAME: &str = "_titles.txt";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VodpipeConfig {
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub dates: DatesSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl VodpipeConfig {
    pub fn channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|channel| channel.name == name)
    }

    pub fn date_convention(&self) -> Result<DateConvention> {
        DateConvention::from_offset_minutes(self.dates.utc_offset_minutes).map_err(|source| {
            ConfigError::Format {
                field: "dates.utc_offset_minutes".to_string(),
                source,
            }
        })
    }

    /// Relative paths resolve against `base`, usually the config file's directory.
    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.paths.data_dir,
            &mut self.paths.recording_dir,
            &mut self.paths.logs_dir,
            &mut self.paths.cookies_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let convention = self.date_convention()?;
        self.tools.validate()?;
        let mut seen = HashSet::new();
        for channel in &self.channels {
            if channel.name.trim().is_empty() {
                return Err(ConfigError::Invalid("channel name must not be empty".into()));
            }
            if !seen.insert(channel.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "channel {} configured twice",
                    channel.name
                )));
            }
            if channel.divide_seconds()? == 0 {
                return Err(ConfigError::Invalid(format!(
                    "channel {}: divide_time must be greater than zero",
                    channel.name
                )));
            }
            channel.scrape.window(&convention)?;
            if let Some(labels) = &channel.labels {
                if labels.title_prefix.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "channel {}: labels.title_prefix must not be empty",
                        channel.name
                    )));
                }
                if !labels.part_format.contains(PART_TOKEN) {
                    return Err(ConfigError::Invalid(format!(
                        "channel {}: labels.part_format must contain {PART_TOKEN}",
                        channel.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub data_dir: PathBuf,
    pub recording_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub cookies_dir: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            recording_dir: PathBuf::from("recordings"),
            logs_dir: PathBuf::from("logs"),
            cookies_dir: PathBuf::from("cookies"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatesSection {
    /// Offset from UTC used to derive calendar dates; system local time when absent.
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub download: CommandTemplate,
    pub fixup: CommandTemplate,
    pub split: CommandTemplate,
    pub cookies_flag: String,
    pub max_requeues: Option<u32>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            download: CommandTemplate::new(
                "yt-dlp",
                [
                    "{cookies_args}",
                    "--fixup",
                    "never",
                    "--retries",
                    "infinite",
                    "--file-access-retries",
                    "infinite",
                    "--fragment-retries",
                    "infinite",
                    "--concurrent-fragments",
                    "5",
                    "-o",
                    "{file_name}.%(ext)s",
                    "{vod_url}",
                ],
            ),
            fixup: CommandTemplate::new(
                "ffmpeg",
                [
                    "-y",
                    "-i",
                    "file:{file_name}.mp4",
                    "-map",
                    "0",
                    "-dn",
                    "-ignore_unknown",
                    "-c",
                    "copy",
                    "-f",
                    "mp4",
                    "-bsf:a",
                    "aac_adtstoasc",
                    "-movflags",
                    "faststart",
                    "file:{temp_file_name}.mp4",
                ],
            ),
            split: CommandTemplate::new(
                "ffmpeg",
                [
                    "-i",
                    "file:{input_file_name}.mp4",
                    "-map",
                    "0",
                    "-c",
                    "copy",
                    "-f",
                    "segment",
                    "-segment_time",
                    "{segment_time}",
                    "-reset_timestamps",
                    "1",
                    "{output_file_name}_%03d.mp4",
                ],
            ),
            cookies_flag: "--cookies".to_string(),
            max_requeues: None,
        }
    }
}

impl ToolsSection {
    pub const DOWNLOAD_PLACEHOLDERS: &'static [&'static str] =
        &["file_name", "vod_url", "cookies_args"];
    pub const FIXUP_PLACEHOLDERS: &'static [&'static str] = &["file_name", "temp_file_name"];
    pub const SPLIT_PLACEHOLDERS: &'static [&'static str] =
        &["input_file_name", "output_file_name", "segment_time"];

    fn validate(&self) -> Result<()> {
        for (label, template, allowed) in [
            ("tools.download", &self.download, Self::DOWNLOAD_PLACEHOLDERS),
            ("tools.fixup", &self.fixup, Self::FIXUP_PLACEHOLDERS),
            ("tools.split", &self.split, Self::SPLIT_PLACEHOLDERS),
        ] {
            template
                .check_placeholders(allowed)
                .map_err(|err| ConfigError::Invalid(format!("{label}: {err}")))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default = "default_divide_time")]
    pub divide_time: String,
    #[serde(default)]
    pub order_before_upload: bool,
    #[serde(default)]
    pub cookies_file: Option<String>,
    #[serde(default = "default_true")]
    pub download: bool,
    #[serde(default)]
    pub scrape: ScrapeSection,
    #[serde(default)]
    pub env_keys: EnvKeysSection,
    #[serde(default)]
    pub labels: Option<LabelSection>,
}

impl ChannelConfig {
    pub fn divide_seconds(&self) -> Result<u64> {
        parse_clock_time(&self.divide_time).map_err(|source| ConfigError::Format {
            field: format!("channels.{}.divide_time", self.name),
            source,
        })
    }

    pub fn recording_path(&self, paths: &PathsSection) -> PathBuf {
        paths.recording_dir.join(&self.name)
    }

    pub fn upload_path(&self, paths: &PathsSection) -> PathBuf {
        self.recording_path(paths).join(UPLOAD_FOLDER_NAME)
    }

    pub fn cookies_path(&self, paths: &PathsSection) -> Option<PathBuf> {
        self.cookies_file
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(|name| paths.cookies_dir.join(name))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeSection {
    /// Skip recordings that started after this wall-clock time.
    #[serde(default)]
    pub before_time: Option<String>,
    /// Skip recordings that started before this wall-clock time.
    #[serde(default)]
    pub after_time: Option<String>,
    #[serde(default = "default_true")]
    pub comment_titles: bool,
}

impl Default for ScrapeSection {
    fn default() -> Self {
        Self {
            before_time: None,
            after_time: None,
            comment_titles: true,
        }
    }
}

impl ScrapeSection {
    /// `(before, after)` bounds in unix seconds.
    pub fn window(&self, convention: &DateConvention) -> Result<(Option<i64>, Option<i64>)> {
        let parse = |field: &str, value: &Option<String>| -> Result<Option<i64>> {
            value
                .as_deref()
                .map(|raw| {
                    convention
                        .parse_local_datetime(raw)
                        .map_err(|source| ConfigError::Format {
                            field: format!("scrape.{field}"),
                            source,
                        })
                })
                .transpose()
        };
        Ok((
            parse("before_time", &self.before_time)?,
            parse("after_time", &self.after_time)?,
        ))
    }
}

/// Names of the environment variables holding platform credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnvKeysSection {
    pub client_id: String,
    pub client_secret: String,
    pub oauth: Option<String>,
}

impl Default for EnvKeysSection {
    fn default() -> Self {
        Self {
            client_id: "TWITCH_CLIENT_ID".to_string(),
            client_secret: "TWITCH_CLIENT_SECRET".to_string(),
            oauth: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelSection {
    pub title_prefix: String,
    #[serde(default = "default_part_format")]
    pub part_format: String,
    #[serde(default)]
    pub omit_part_if_single: bool,
}

fn default_divide_time() -> String {
    DEFAULT_DIVIDE_TIME.to_string()
}

fn default_part_format() -> String {
    "Part {PART}".to_string()
}

fn default_true() -> bool {
    true
}

/// Loads, path-resolves and validates a configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<VodpipeConfig> {
    let path = path.as_ref();
    let mut config: VodpipeConfig = load_toml(path)?;
    let base = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    config.resolve_paths(&base);
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/vodpipe.toml");
        let config = load_config(&path).expect("fixture config should parse");
        assert_eq!(config.channels.len(), 2);
        let first = &config.channels[0];
        assert_eq!(first.name, "examplestreamer");
        assert_eq!(first.divide_seconds().unwrap(), 43_197);
        assert!(first.order_before_upload);
        assert!(first.labels.is_some());
        assert!(config.paths.data_dir.is_absolute());
        assert_eq!(config.tools.download.program, "yt-dlp");
        assert_eq!(config.tools.max_requeues, None);
        let second = &config.channels[1];
        assert!(!second.download);
        assert_eq!(second.env_keys.client_id, "OTHER_CLIENT_ID");
        assert_eq!(second.divide_time, DEFAULT_DIVIDE_TIME);
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let raw = r#"
            [tools.fixup]
            program = "ffmpeg"
            args = ["-i", "{file_name}.mp4", "{output}.mp4"]
        "#;
        let config: VodpipeConfig = toml::from_str(raw).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("output")));
    }

    #[test]
    fn rejects_duplicate_and_empty_channels() {
        let duplicate: VodpipeConfig = toml::from_str(
            r#"
            [[channels]]
            name = "a"
            [[channels]]
            name = "a"
        "#,
        )
        .unwrap();
        assert!(duplicate.validate().is_err());

        let empty: VodpipeConfig = toml::from_str("[[channels]]\nname = \" \"\n").unwrap();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn rejects_bad_divide_time_and_window() {
        let bad_divide: VodpipeConfig =
            toml::from_str("[[channels]]\nname = \"a\"\ndivide_time = \"12h\"\n").unwrap();
        assert!(matches!(
            bad_divide.validate(),
            Err(ConfigError::Format { .. })
        ));

        let zero: VodpipeConfig =
            toml::from_str("[[channels]]\nname = \"a\"\ndivide_time = \"00:00:00\"\n").unwrap();
        assert!(matches!(zero.validate(), Err(ConfigError::Invalid(_))));

        let bad_window: VodpipeConfig = toml::from_str(
            "[[channels]]\nname = \"a\"\n[channels.scrape]\nbefore_time = \"tomorrow\"\n",
        )
        .unwrap();
        assert!(bad_window.validate().is_err());
    }

    #[test]
    fn rejects_label_format_without_part_token() {
        let raw = r#"
            [[channels]]
            name = "a"
            [channels.labels]
            title_prefix = "A VOD"
            part_format = "Part"
        "#;
        let config: VodpipeConfig = toml::from_str(raw).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("part_format")));

        let fixed = raw.replace("\"Part\"", "\"Part {PART}\"");
        let config: VodpipeConfig = toml::from_str(&fixed).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn scrape_window_uses_convention() {
        let scrape = ScrapeSection {
            before_time: Some("2024-03-02 00:00:00".into()),
            after_time: None,
            comment_titles: true,
        };
        let (before, after) = scrape.window(&DateConvention::utc()).unwrap();
        assert_eq!(before, Some(1_709_337_600));
        assert_eq!(after, None);
    }

    #[test]
    fn cookies_path_ignores_blank_names() {
        let paths = PathsSection::default();
        let mut channel: ChannelConfig = toml::from_str("name = \"a\"\n").unwrap();
        assert!(channel.cookies_path(&paths).is_none());
        channel.cookies_file = Some("a.txt".into());
        assert_eq!(
            channel.cookies_path(&paths),
            Some(PathBuf::from("cookies/a.txt"))
        );
        channel.cookies_file = Some("  ".into());
        assert!(channel.cookies_path(&paths).is_none());
    }
}
