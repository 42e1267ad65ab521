use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::channel::ChannelContext;
use crate::timecode::{parse_clock_duration, parse_timestamp};
use crate::vod::{ExpectedSplit, JsonVodStore, VodMap, VodRecord, VodStatus};

use super::error::{DiscoveryError, DiscoveryResult};
use super::source::{RawRecording, VodSourceFactory, ARCHIVE_TYPE};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub channel: String,
    pub seen: usize,
    pub added: Vec<String>,
    pub retained: usize,
    pub retired: Vec<String>,
    pub skipped_live: usize,
    pub skipped_type: usize,
    pub skipped_window: usize,
}

struct Candidate {
    raw: RawRecording,
    unix_timestamp: i64,
    date_str: String,
    duration: u64,
}

/// Merges a fresh platform listing into a channel's existing records.
///
/// Tracked records are carried over untouched. New recordings get a
/// `{date}_{NNN}` file name from their position among the same-date
/// recordings of this listing, sorted by start time. When that name is held
/// by a record that stays tracked, the next free index is taken instead.
/// UPLOADED records that the listing no longer mentions are retired.
pub fn merge_discovered(
    existing: &VodMap,
    recordings: Vec<RawRecording>,
    active_stream_ids: &HashSet<String>,
    channel: &ChannelContext,
) -> DiscoveryResult<(VodMap, DiscoveryReport)> {
    let mut report = DiscoveryReport {
        channel: channel.name.clone(),
        ..DiscoveryReport::default()
    };
    let mut seen_ids = HashSet::new();
    let mut by_date: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();

    for raw in recordings {
        if raw.type_tag != ARCHIVE_TYPE {
            report.skipped_type += 1;
            continue;
        }
        if raw
            .stream_id
            .as_ref()
            .is_some_and(|stream_id| active_stream_ids.contains(stream_id))
        {
            info!(channel = %channel.name, vod_id = %raw.id, duration = %raw.duration, "skipping ongoing stream");
            report.skipped_live += 1;
            continue;
        }
        let format_error = |source| DiscoveryError::Format {
            vod_id: raw.id.clone(),
            source,
        };
        let unix_timestamp = parse_timestamp(&raw.created_at).map_err(format_error)?;
        let date_str = channel
            .convention
            .date_key(unix_timestamp)
            .map_err(format_error)?;
        let duration = parse_clock_duration(&raw.duration).map_err(format_error)?;
        if channel.before.is_some_and(|before| unix_timestamp > before)
            || channel.after.is_some_and(|after| unix_timestamp < after)
        {
            report.skipped_window += 1;
            continue;
        }
        if !seen_ids.insert(raw.id.clone()) {
            debug!(vod_id = %raw.id, "duplicate recording in listing");
            continue;
        }
        by_date.entry(date_str.clone()).or_default().push(Candidate {
            raw,
            unix_timestamp,
            date_str,
            duration,
        });
    }

    let mut taken: HashSet<String> = existing
        .iter()
        .filter(|(vod_id, record)| {
            record.status != VodStatus::Uploaded || seen_ids.contains(*vod_id)
        })
        .map(|(_, record)| record.file_name.clone())
        .collect();
    let mut merged = VodMap::new();
    for candidates in by_date.values_mut() {
        candidates.sort_by_key(|candidate| candidate.unix_timestamp);
        for (index, candidate) in candidates.iter().enumerate() {
            report.seen += 1;
            let vod_id = candidate.raw.id.clone();
            if let Some(tracked) = existing.get(&vod_id) {
                merged.insert(vod_id, tracked.clone());
                report.retained += 1;
                continue;
            }
            let mut sub_index = index;
            let mut file_name = format!("{}_{sub_index:03}", candidate.date_str);
            while taken.contains(&file_name) {
                sub_index += 1;
                file_name = format!("{}_{sub_index:03}", candidate.date_str);
            }
            if sub_index != index {
                warn!(
                    channel = %channel.name,
                    vod_id = %vod_id,
                    file_name = %file_name,
                    "listing position clashes with a tracked record, using next free name"
                );
            }
            taken.insert(file_name.clone());
            let expected_splits =
                ExpectedSplit::plan(&file_name, candidate.duration, channel.divide_seconds);
            merged.insert(
                vod_id.clone(),
                VodRecord {
                    original_title: candidate.raw.title.clone(),
                    url: candidate.raw.url.clone(),
                    unix_timestamp: candidate.unix_timestamp,
                    date_str: candidate.date_str.clone(),
                    file_name,
                    status: VodStatus::NotDownloaded,
                    duration_str: candidate.raw.duration.clone(),
                    duration: candidate.duration,
                    expected_splits,
                },
            );
            report.added.push(vod_id);
        }
    }

    for (vod_id, record) in existing {
        if merged.contains_key(vod_id) {
            continue;
        }
        if record.status == VodStatus::Uploaded {
            info!(channel = %channel.name, file_name = %record.file_name, "retiring uploaded record");
            report.retired.push(vod_id.clone());
            continue;
        }
        merged.insert(vod_id.clone(), record.clone());
        report.retained += 1;
    }
    Ok((merged, report))
}

/// `title\nfile_name` blocks for every record not yet uploaded, ordered by
/// file name. Angle brackets are swapped for full-width lookalikes.
pub fn render_titles(vods: &VodMap) -> Option<String> {
    let mut pending: Vec<&VodRecord> = vods
        .values()
        .filter(|record| record.status != VodStatus::Uploaded)
        .collect();
    if pending.is_empty() {
        return None;
    }
    pending.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    let blocks: Vec<String> = pending
        .iter()
        .map(|record| {
            let title = record.original_title.replace('<', "＜").replace('>', "＞");
            format!("{title}\n{}", record.file_name)
        })
        .collect();
    Some(blocks.join("\n\n"))
}

/// Discovery stage: fetch, merge, persist.
#[derive(Clone)]
pub struct Discoverer {
    store: JsonVodStore,
    sources: Arc<dyn VodSourceFactory>,
}

impl Discoverer {
    pub fn new(store: JsonVodStore, sources: Arc<dyn VodSourceFactory>) -> Self {
        Self { store, sources }
    }

    pub async fn discover(&self, channel: &ChannelContext) -> DiscoveryResult<DiscoveryReport> {
        info!(channel = %channel.name, "discovering recordings");
        let source = self.sources.source_for(channel)?;
        let active = source.fetch_active_stream_ids(&channel.name).await?;
        let recordings = source.fetch_recordings(&channel.name).await?;
        let existing = self.store.load(&channel.name)?;
        let (merged, report) = merge_discovered(&existing, recordings, &active, channel)?;
        self.store.save(&channel.name, &merged)?;

        if channel.comment_titles {
            if let Some(titles) = render_titles(&merged) {
                let path = channel.titles_path();
                std::fs::create_dir_all(&channel.recording_path)
                    .and_then(|_| std::fs::write(&path, titles))
                    .map_err(|source| DiscoveryError::Io { source, path })?;
            }
        }
        info!(
            channel = %channel.name,
            added = report.added.len(),
            retained = report.retained,
            retired = report.retired.len(),
            "discovery finished"
        );
        Ok(report)
    }
}
