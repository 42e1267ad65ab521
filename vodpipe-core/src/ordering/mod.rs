mod error;
mod labels;
mod plan;

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use tracing::info;
use walkdir::WalkDir;

use crate::channel::ChannelContext;
use crate::vod::{JsonVodStore, VodStatus};

pub use error::{OrderError, OrderResult};
pub use labels::{apply_labels, label_for, PART_TOKEN};
pub use plan::{plan_order, DateGroup, Slot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovedFile {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderReport {
    pub channel: String,
    pub groups: Vec<String>,
    pub moved: Vec<MovedFile>,
    pub passive: usize,
    pub ordered: Vec<String>,
    pub labelled: Vec<MovedFile>,
}

/// Renumbers same-date parts into the channel's upload directory.
#[derive(Debug, Clone)]
pub struct OrderingEngine {
    store: JsonVodStore,
}

impl OrderingEngine {
    pub fn new(store: JsonVodStore) -> Self {
        Self { store }
    }

    pub fn order(&self, channel: &ChannelContext) -> OrderResult<OrderReport> {
        let mut vods = self.store.load(&channel.name)?;
        let mut report = OrderReport {
            channel: channel.name.clone(),
            ..OrderReport::default()
        };
        let groups = plan_order(&vods, |_, record| {
            scan_parts(&channel.recording_path, &record.file_name)
        })?;
        if groups.is_empty() {
            info!(channel = %channel.name, "nothing to order");
            return Ok(report);
        }

        // Every target is checked before the first rename.
        for group in &groups {
            for (index, slot) in group.slots.iter().enumerate() {
                let target = channel.upload_path.join(group.target_name(index));
                if slot.movable && target.exists() {
                    return Err(OrderError::TargetExists { path: target });
                }
            }
        }
        std::fs::create_dir_all(&channel.upload_path).map_err(|source| OrderError::Io {
            source,
            path: channel.upload_path.clone(),
        })?;

        for group in &groups {
            info!(channel = %channel.name, date = %group.date, files = group.slots.len(), "ordering date group");
            for (index, slot) in group.slots.iter().enumerate() {
                let target_name = group.target_name(index);
                if !slot.movable {
                    info!(file = %slot.stem, position = index + 1, "keeping position for earlier file");
                    report.passive += 1;
                    continue;
                }
                let source = channel.media_path(&slot.stem);
                let target = channel.upload_path.join(&target_name);
                std::fs::rename(&source, &target).map_err(|err| OrderError::Io {
                    source: err,
                    path: source.clone(),
                })?;
                info!(from = %slot.stem, to = %target_name, "moved part");
                report.moved.push(MovedFile {
                    from: format!("{}.mp4", slot.stem),
                    to: target_name,
                });
            }
            for vod_id in group.primary_ids() {
                if let Some(record) = vods.get_mut(&vod_id) {
                    record.advance(&vod_id, VodStatus::Ordered)?;
                }
                report.ordered.push(vod_id);
            }
            self.store.save(&channel.name, &vods)?;
            report.groups.push(group.date.clone());
        }
        Ok(report)
    }

    /// Orders, then applies upload labels when the channel configures them.
    pub fn order_and_label(&self, channel: &ChannelContext) -> OrderResult<OrderReport> {
        let mut report = self.order(channel)?;
        if let Some(labels) = &channel.labels {
            report.labelled = apply_labels(&channel.upload_path, labels)?
                .into_iter()
                .map(|(from, to)| MovedFile { from, to })
                .collect();
        }
        Ok(report)
    }
}

/// Stems of `{file_name}*.mp4` files directly inside `dir`, sorted.
pub fn scan_parts(dir: &Path, file_name: &str) -> OrderResult<Vec<String>> {
    let pattern = Regex::new(&format!(r"^{}.*\.mp4$", regex::escape(file_name)))?;
    let mut stems: Vec<String> = list_mp4_names(dir)?
        .into_iter()
        .filter(|name| pattern.is_match(name))
        .filter_map(|name| name.strip_suffix(".mp4").map(str::to_string))
        .collect();
    stems.sort();
    Ok(stems)
}

/// Names of the `.mp4` files directly inside `dir`, sorted. A missing
/// directory has no files.
pub(crate) fn list_mp4_names(dir: &Path) -> OrderResult<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| OrderError::Scan {
            source,
            path: PathBuf::from(dir),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(".mp4") {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
