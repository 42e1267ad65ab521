use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channel::ChannelContext;

use super::error::DiscoveryResult;

pub const ARCHIVE_TYPE: &str = "archive";

/// One recording as reported by the platform, before any filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecording {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
    pub created_at: String,
    pub duration: String,
    #[serde(default)]
    pub stream_id: Option<String>,
    #[serde(rename = "type")]
    pub type_tag: String,
}

/// Platform collaborator for a single channel.
#[async_trait]
pub trait VodSource: Send + Sync {
    async fn fetch_recordings(&self, channel: &str) -> DiscoveryResult<Vec<RawRecording>>;
    async fn fetch_active_stream_ids(&self, channel: &str) -> DiscoveryResult<HashSet<String>>;
}

/// Builds the source for a channel; credentials are resolved per channel.
pub trait VodSourceFactory: Send + Sync {
    fn source_for(&self, channel: &ChannelContext) -> DiscoveryResult<Arc<dyn VodSource>>;
}
