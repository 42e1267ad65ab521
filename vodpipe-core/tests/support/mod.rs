#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use vodpipe_core::discovery::{
    DiscoveryError, DiscoveryResult, RawRecording, VodSource, VodSourceFactory,
};
use vodpipe_core::{
    ChannelContext, CommandTemplate, ExpectedSplit, ProcessorResult, ToolCommand, ToolOutput,
    ToolRunner, ToolsSection, VodRecord, VodStatus,
};

pub const NOT_SUBSCRIPTABLE: &str = "ERROR: 'NoneType' object is not subscriptable\n";

pub fn fragment_race(file_name: &str) -> ToolOutput {
    ToolOutput::failure(
        1,
        format!("ERROR: [Errno 2] No such file or directory: '{file_name}.mp4.part-Frag7'\n"),
    )
}

/// Templates driving the fake tools below.
pub fn fake_tools() -> ToolsSection {
    ToolsSection {
        download: CommandTemplate::new(
            "fake-download",
            ["{cookies_args}", "{file_name}", "{vod_url}"],
        ),
        fixup: CommandTemplate::new("fake-fixup", ["{file_name}", "{temp_file_name}"]),
        split: CommandTemplate::new(
            "fake-split",
            ["{input_file_name}", "{output_file_name}", "{segment_time}"],
        ),
        cookies_flag: "--cookies".into(),
        max_requeues: None,
    }
}

/// Pretends to be yt-dlp/ffmpeg: scripted failures are returned first, then
/// each program writes the files the real tool would.
#[derive(Default)]
pub struct FakeRunner {
    scripts: Mutex<HashMap<String, VecDeque<ToolOutput>>>,
    calls: Mutex<Vec<ToolCommand>>,
    split_parts: Mutex<HashMap<String, usize>>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, program: &str, outputs: Vec<ToolOutput>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(program.to_string())
            .or_default()
            .extend(outputs);
    }

    pub fn split_into(&self, file_name: &str, parts: usize) {
        self.split_parts
            .lock()
            .unwrap()
            .insert(file_name.to_string(), parts);
    }

    pub fn calls(&self) -> Vec<ToolCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.program == program)
            .count()
    }
}

fn touch(path: &Path) {
    std::fs::write(path, b"media").unwrap();
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(&self, command: &ToolCommand, cwd: &Path) -> ProcessorResult<ToolOutput> {
        self.calls.lock().unwrap().push(command.clone());
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&command.program)
            .and_then(VecDeque::pop_front);
        if let Some(output) = scripted {
            if !output.succeeded() {
                return Ok(output);
            }
        }
        let args = &command.args;
        match command.program.as_str() {
            "fake-download" => {
                let file_name = &args[args.len() - 2];
                touch(&cwd.join(format!("{file_name}.mp4")));
            }
            "fake-fixup" => {
                if !cwd.join(format!("{}.mp4", args[0])).exists() {
                    return Ok(ToolOutput::failure(1, "fixup input missing"));
                }
                touch(&cwd.join(format!("{}.mp4", args[1])));
            }
            "fake-split" => {
                let parts = self
                    .split_parts
                    .lock()
                    .unwrap()
                    .get(&args[1])
                    .copied()
                    .unwrap_or(2);
                for index in 0..parts {
                    touch(&cwd.join(format!("{}_{index:03}.mp4", args[1])));
                }
            }
            _ => {}
        }
        Ok(ToolOutput::success())
    }
}

/// Fixed platform listing shared by every channel.
#[derive(Default)]
pub struct FakeSource {
    pub recordings: Mutex<Vec<RawRecording>>,
    pub active: Mutex<HashSet<String>>,
}

impl FakeSource {
    pub fn with(recordings: Vec<RawRecording>) -> Arc<Self> {
        Arc::new(Self {
            recordings: Mutex::new(recordings),
            active: Mutex::new(HashSet::new()),
        })
    }

    pub fn replace(&self, recordings: Vec<RawRecording>) {
        *self.recordings.lock().unwrap() = recordings;
    }
}

#[async_trait]
impl VodSource for FakeSource {
    async fn fetch_recordings(&self, _channel: &str) -> DiscoveryResult<Vec<RawRecording>> {
        Ok(self.recordings.lock().unwrap().clone())
    }

    async fn fetch_active_stream_ids(&self, _channel: &str) -> DiscoveryResult<HashSet<String>> {
        Ok(self.active.lock().unwrap().clone())
    }
}

/// Hands out sources by channel name; unknown channels lack credentials.
#[derive(Default)]
pub struct FakeSources {
    pub by_channel: HashMap<String, Arc<FakeSource>>,
}

impl FakeSources {
    pub fn single(channel: &str, source: Arc<FakeSource>) -> Arc<Self> {
        let mut by_channel = HashMap::new();
        by_channel.insert(channel.to_string(), source);
        Arc::new(Self { by_channel })
    }
}

impl VodSourceFactory for FakeSources {
    fn source_for(&self, channel: &ChannelContext) -> DiscoveryResult<Arc<dyn VodSource>> {
        self.by_channel
            .get(&channel.name)
            .map(|source| Arc::clone(source) as Arc<dyn VodSource>)
            .ok_or_else(|| DiscoveryError::Credential(format!("{}_CLIENT_ID", channel.name)))
    }
}

pub fn recording(id: &str, created_at: &str, duration: &str) -> RawRecording {
    RawRecording {
        id: id.to_string(),
        title: format!("Stream {id}"),
        url: format!("https://www.twitch.tv/videos/{id}"),
        created_at: created_at.to_string(),
        duration: duration.to_string(),
        stream_id: Some(format!("stream-{id}")),
        type_tag: "archive".to_string(),
    }
}

/// A tracked record as discovery would have written it.
pub fn tracked(
    file_name: &str,
    unix_timestamp: i64,
    duration: u64,
    divide_seconds: u64,
    status: VodStatus,
) -> VodRecord {
    let date_str = file_name
        .rsplit_once('_')
        .map(|(date, _)| date.to_string())
        .unwrap_or_else(|| file_name.to_string());
    VodRecord {
        original_title: format!("Title of {file_name}"),
        url: format!("https://www.twitch.tv/videos/{unix_timestamp}"),
        unix_timestamp,
        date_str,
        file_name: file_name.to_string(),
        status,
        duration_str: format!("{duration}s"),
        duration,
        expected_splits: ExpectedSplit::plan(file_name, duration, divide_seconds),
    }
}

pub fn touch_media(dir: &Path, stem: &str) {
    std::fs::create_dir_all(dir).unwrap();
    touch(&dir.join(format!("{stem}.mp4")));
}
