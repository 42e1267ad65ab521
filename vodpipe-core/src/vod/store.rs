use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use super::models::{VodMap, VodStatus};
use super::{StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct JsonVodStoreBuilder {
    data_dir: Option<PathBuf>,
    create_if_missing: bool,
    pretty: bool,
}

impl Default for JsonVodStoreBuilder {
    fn default() -> Self {
        Self {
            data_dir: None,
            create_if_missing: true,
            pretty: true,
        }
    }
}

impl JsonVodStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.data_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn pretty(mut self, value: bool) -> Self {
        self.pretty = value;
        self
    }

    pub fn build(self) -> StoreResult<JsonVodStore> {
        let data_dir = self.data_dir.ok_or(StoreError::MissingStore)?;
        Ok(JsonVodStore {
            data_dir,
            create_if_missing: self.create_if_missing,
            pretty: self.pretty,
        })
    }
}

/// One JSON document per channel, rewritten in full on every save.
#[derive(Debug, Clone)]
pub struct JsonVodStore {
    data_dir: PathBuf,
    create_if_missing: bool,
    pretty: bool,
}

impl JsonVodStore {
    pub fn builder() -> JsonVodStoreBuilder {
        JsonVodStoreBuilder::new()
    }

    pub fn new(data_dir: impl AsRef<Path>) -> StoreResult<Self> {
        JsonVodStoreBuilder::new().data_dir(data_dir).build()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn channel_path(&self, channel: &str) -> PathBuf {
        self.data_dir.join(format!("{channel}.json"))
    }

    /// Loads a channel's records; a channel never saved before is empty.
    pub fn load(&self, channel: &str) -> StoreResult<VodMap> {
        let path = self.channel_path(channel);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(VodMap::new()),
            Err(source) => return Err(StoreError::Io { source, path }),
        };
        if contents.trim().is_empty() {
            return Ok(VodMap::new());
        }
        serde_json::from_str(&contents).map_err(|source| StoreError::Serde { source, path })
    }

    /// Atomically replaces a channel's records: the document is written to a
    /// sibling temp file and renamed over the old one.
    pub fn save(&self, channel: &str, vods: &VodMap) -> StoreResult<()> {
        let path = self.channel_path(channel);
        if self.create_if_missing {
            fs::create_dir_all(&self.data_dir).map_err(|source| StoreError::Io {
                source,
                path: self.data_dir.clone(),
            })?;
        }
        let mut temp = NamedTempFile::new_in(&self.data_dir).map_err(|source| StoreError::Io {
            source,
            path: self.data_dir.clone(),
        })?;
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(vods)
        } else {
            serde_json::to_vec(vods)
        }
        .map_err(|source| StoreError::Serde {
            source,
            path: path.clone(),
        })?;
        temp.write_all(&encoded)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|source| StoreError::Io {
                source,
                path: temp.path().to_path_buf(),
            })?;
        temp.persist(&path).map_err(|source| StoreError::Persist {
            source,
            path: path.clone(),
        })?;
        debug!(channel, records = vods.len(), path = %path.display(), "state saved");
        Ok(())
    }

    /// Moves one record forward and persists the whole mapping straight away.
    pub fn advance(
        &self,
        channel: &str,
        vods: &mut VodMap,
        vod_id: &str,
        next: VodStatus,
    ) -> StoreResult<()> {
        let record = vods.get_mut(vod_id).ok_or_else(|| StoreError::NotFound {
            vod_id: vod_id.to_string(),
        })?;
        record.advance(vod_id, next)?;
        self.save(channel, vods)
    }

    pub fn status_counts(&self, channel: &str) -> StoreResult<BTreeMap<VodStatus, usize>> {
        let mut counts = BTreeMap::new();
        for record in self.load(channel)?.values() {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
