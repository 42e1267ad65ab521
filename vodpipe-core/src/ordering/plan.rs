use std::collections::BTreeSet;

use serde::Serialize;

use crate::vod::{VodMap, VodRecord, VodStatus};

use super::error::{OrderError, OrderResult};

/// One file position inside a date group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub vod_id: String,
    pub stem: String,
    /// Passive slots belong to records handled in an earlier run; they hold
    /// their position but their files are left alone.
    pub movable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateGroup {
    pub date: String,
    pub slots: Vec<Slot>,
}

impl DateGroup {
    /// Upload name for the slot at `index` (0-based).
    pub fn target_name(&self, index: usize) -> String {
        if self.slots.len() == 1 {
            format!("{}.mp4", self.date)
        } else {
            format!("{}_{:03}.mp4", self.date, index + 1)
        }
    }

    /// Records in this group that move to ORDERED once the group is done.
    pub fn primary_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for slot in self.slots.iter().filter(|slot| slot.movable) {
            if !ids.contains(&slot.vod_id) {
                ids.push(slot.vod_id.clone());
            }
        }
        ids
    }
}

/// Groups SPLIT records with every other record sharing their date.
///
/// `resolve_parts` returns the part file stems present on disk for a SPLIT
/// record. They must match the record's expected part names exactly, or the
/// whole plan is rejected.
pub fn plan_order<F>(vods: &VodMap, mut resolve_parts: F) -> OrderResult<Vec<DateGroup>>
where
    F: FnMut(&str, &VodRecord) -> OrderResult<Vec<String>>,
{
    let dates: BTreeSet<&str> = vods
        .values()
        .filter(|record| record.status == VodStatus::Split)
        .map(|record| record.date_str.as_str())
        .collect();
    let mut candidates: Vec<(&String, &VodRecord)> = vods
        .iter()
        .filter(|(_, record)| dates.contains(record.date_str.as_str()))
        .collect();
    candidates.sort_by_key(|(_, record)| record.unix_timestamp);

    let mut groups: Vec<DateGroup> = Vec::new();
    for (vod_id, record) in candidates {
        let index = match groups.iter().position(|group| group.date == record.date_str) {
            Some(index) => index,
            None => {
                groups.push(DateGroup {
                    date: record.date_str.clone(),
                    slots: Vec::new(),
                });
                groups.len() - 1
            }
        };

        let (stems, movable) = if record.status == VodStatus::Split {
            let mut found = resolve_parts(vod_id.as_str(), record)?;
            found.sort();
            let expected = record.part_names();
            if found != expected {
                return Err(OrderError::Consistency {
                    vod_id: vod_id.clone(),
                    expected,
                    found,
                });
            }
            (found, true)
        } else if record.should_split() {
            (record.split_names(), false)
        } else {
            (vec![record.file_name.clone()], false)
        };

        groups[index].slots.extend(stems.into_iter().map(|stem| Slot {
            vod_id: vod_id.clone(),
            stem,
            movable,
        }));
    }
    Ok(groups)
}
