use std::path::Path;

use tracing::{info, warn};

use crate::config::LabelSection;

use super::error::{OrderError, OrderResult};
use super::list_mp4_names;

pub const PART_TOKEN: &str = "{PART}";

/// Human-facing name for an ordered upload file, or `None` when the file
/// already carries the prefix or is not a `{date}` / `{date}_{NNN}` name.
pub fn label_for(file_name: &str, siblings: &[String], labels: &LabelSection) -> Option<String> {
    if file_name.starts_with(&labels.title_prefix) {
        return None;
    }
    let stem = file_name.strip_suffix(".mp4")?;
    let (date, part) = match stem.split_once('_') {
        None => (stem, 1u32),
        Some((date, part)) => (date, part.parse::<u32>().ok()?),
    };
    let single = labels.omit_part_if_single
        && part == 1
        && !siblings.iter().any(|name| name == &format!("{date}_002.mp4"));
    if single {
        return Some(format!("{} [{date}].mp4", labels.title_prefix));
    }
    let part_label = labels.part_format.replace(PART_TOKEN, &part.to_string());
    Some(format!("{} [{date}] {part_label}.mp4", labels.title_prefix))
}

/// Renames ordered files in `upload_dir` to their labelled names.
pub fn apply_labels(upload_dir: &Path, labels: &LabelSection) -> OrderResult<Vec<(String, String)>> {
    if !upload_dir.exists() {
        return Ok(Vec::new());
    }
    let names = list_mp4_names(upload_dir)?;
    let mut planned = Vec::new();
    for name in &names {
        match label_for(name, &names, labels) {
            Some(label) => planned.push((name.clone(), label)),
            None if !name.starts_with(&labels.title_prefix) => {
                warn!(file = %name, "not an ordered upload name, leaving as is");
            }
            None => {}
        }
    }
    for (_, label) in &planned {
        let target = upload_dir.join(label);
        if target.exists() {
            return Err(OrderError::TargetExists { path: target });
        }
    }
    for (name, label) in &planned {
        let source = upload_dir.join(name);
        std::fs::rename(&source, upload_dir.join(label))
            .map_err(|source_err| OrderError::Io {
                source: source_err,
                path: source.clone(),
            })?;
        info!(from = %name, to = %label, "labelled upload file");
    }
    Ok(planned)
}
