use std::fmt;

use serde::Serialize;

use crate::vod::VodStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discover,
    Download,
    Fixup,
    Split,
    Order,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discover => "discover",
            Stage::Download => "download",
            Stage::Fixup => "fixup",
            Stage::Split => "split",
            Stage::Order => "order",
        }
    }

    /// Status a record must hold to be picked up by this stage.
    pub fn input_status(&self) -> Option<VodStatus> {
        match self {
            Stage::Discover => None,
            Stage::Download => Some(VodStatus::NotDownloaded),
            Stage::Fixup => Some(VodStatus::Downloaded),
            Stage::Split => Some(VodStatus::Fixed),
            Stage::Order => Some(VodStatus::Split),
        }
    }

    pub fn output_status(&self) -> Option<VodStatus> {
        match self {
            Stage::Discover => Some(VodStatus::NotDownloaded),
            Stage::Download => Some(VodStatus::Downloaded),
            Stage::Fixup => Some(VodStatus::Fixed),
            Stage::Split => Some(VodStatus::Split),
            Stage::Order => Some(VodStatus::Ordered),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A program and its argument vector. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success() -> Self {
        Self {
            exit_code: Some(0),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stderr: stderr.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// How many times a command may be re-issued after transient failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_requeues: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self { max_requeues: None }
    }

    pub fn bounded(max_requeues: u32) -> Self {
        Self {
            max_requeues: Some(max_requeues),
        }
    }

    pub fn allows(&self, requeues_so_far: u32) -> bool {
        self.max_requeues
            .map_or(true, |limit| requeues_so_far < limit)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub channel: String,
    pub stage: Option<Stage>,
    pub advanced: Vec<String>,
    pub skipped: Vec<String>,
    pub requeues: u32,
}

impl StageReport {
    pub fn new(channel: &str, stage: Stage) -> Self {
        Self {
            channel: channel.to_string(),
            stage: Some(stage),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_chain_statuses() {
        for pair in [Stage::Download, Stage::Fixup, Stage::Split, Stage::Order].windows(2) {
            assert_eq!(pair[0].output_status(), pair[1].input_status());
        }
    }

    #[test]
    fn command_display_quotes_spaced_args() {
        let command = ToolCommand::new("ffmpeg", vec!["-i".into(), "file:a b.mp4".into()]);
        assert_eq!(command.to_string(), "ffmpeg -i \"file:a b.mp4\"");
    }

    #[test]
    fn retry_policy_bounds() {
        assert!(RetryPolicy::unbounded().allows(u32::MAX - 1));
        let bounded = RetryPolicy::bounded(2);
        assert!(bounded.allows(1));
        assert!(!bounded.allows(2));
    }
}
