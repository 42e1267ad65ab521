use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::error::{StoreError, StoreResult};

/// Per-channel state, keyed by recording id.
pub type VodMap = BTreeMap<String, VodRecord>;

/// Lifecycle position of a recording. Declaration order is rank order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VodStatus {
    NotDownloaded,
    Downloaded,
    Fixed,
    Split,
    Ordered,
    ReadyToUpload,
    Uploaded,
    FailedToUpload,
}

impl VodStatus {
    pub const ALL: [VodStatus; 8] = [
        VodStatus::NotDownloaded,
        VodStatus::Downloaded,
        VodStatus::Fixed,
        VodStatus::Split,
        VodStatus::Ordered,
        VodStatus::ReadyToUpload,
        VodStatus::Uploaded,
        VodStatus::FailedToUpload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VodStatus::NotDownloaded => "NOT_DOWNLOADED",
            VodStatus::Downloaded => "DOWNLOADED",
            VodStatus::Fixed => "FIXED",
            VodStatus::Split => "SPLIT",
            VodStatus::Ordered => "ORDERED",
            VodStatus::ReadyToUpload => "READY_TO_UPLOAD",
            VodStatus::Uploaded => "UPLOADED",
            VodStatus::FailedToUpload => "FAILED_TO_UPLOAD",
        }
    }

    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Whether `next` is a legal move from `self`. Staying put is allowed.
    pub fn can_advance_to(&self, next: VodStatus) -> bool {
        match next {
            VodStatus::FailedToUpload => *self >= VodStatus::Split,
            _ => next >= *self,
        }
    }
}

impl fmt::Display for VodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VodStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        VodStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("unknown vod status: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectedSplit {
    pub name: String,
    pub duration: u64,
}

impl ExpectedSplit {
    /// Split plan for a recording of `duration` seconds cut every `interval`
    /// seconds. Recordings that fit in one interval get no plan. A duration
    /// that is an exact multiple of the interval ends on a full-length part.
    pub fn plan(file_name: &str, duration: u64, interval: u64) -> Vec<ExpectedSplit> {
        if interval == 0 || duration <= interval {
            return Vec::new();
        }
        let count = duration.div_ceil(interval);
        (0..count)
            .map(|index| {
                let remainder = duration % interval;
                let part_duration = if index + 1 == count && remainder != 0 {
                    remainder
                } else {
                    interval
                };
                ExpectedSplit {
                    name: format!("{file_name}_{index:03}"),
                    duration: part_duration,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VodRecord {
    pub original_title: String,
    pub url: String,
    #[serde(deserialize_with = "whole_seconds")]
    pub unix_timestamp: i64,
    pub date_str: String,
    pub file_name: String,
    pub status: VodStatus,
    #[serde(default)]
    pub duration_str: String,
    pub duration: u64,
    #[serde(default)]
    pub expected_splits: Vec<ExpectedSplit>,
}

impl VodRecord {
    pub fn should_split(&self) -> bool {
        self.expected_splits.len() > 1
    }

    /// Part files the split stage leaves on disk for this recording.
    pub fn part_names(&self) -> Vec<String> {
        if self.should_split() {
            self.split_names()
        } else {
            vec![format!("{}_000", self.file_name)]
        }
    }

    pub fn split_names(&self) -> Vec<String> {
        self.expected_splits
            .iter()
            .map(|split| split.name.clone())
            .collect()
    }

    pub fn advance(&mut self, vod_id: &str, next: VodStatus) -> StoreResult<()> {
        if !self.status.can_advance_to(next) {
            return Err(StoreError::InvalidTransition {
                vod_id: vod_id.to_string(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Accepts integers and integral floats; earlier state files wrote the start
/// time as a float.
fn whole_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    if let Some(value) = number.as_i64() {
        return Ok(value);
    }
    match number.as_f64() {
        Some(value) if value.fract() == 0.0 && value.abs() < i64::MAX as f64 => Ok(value as i64),
        _ => Err(serde::de::Error::custom(format!(
            "unix_timestamp must be whole seconds, got {number}"
        ))),
    }
}
