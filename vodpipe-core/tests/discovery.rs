mod support;

use std::sync::Arc;

use tempfile::{tempdir, TempDir};
use vodpipe_core::{
    ChannelContext, Discoverer, DiscoveryError, JsonVodStore, VodMap, VodStatus,
};

use support::{recording, tracked, FakeSource, FakeSources};

const HOUR: u64 = 3_600;
const CHANNEL: &str = "somechannel";

fn setup(source: Arc<FakeSource>) -> (TempDir, JsonVodStore, ChannelContext, Discoverer) {
    let dir = tempdir().unwrap();
    let store = JsonVodStore::new(dir.path().join("data")).unwrap();
    let channel = ChannelContext::new(CHANNEL, dir.path().join("recordings"), 12 * HOUR);
    let discoverer = Discoverer::new(store.clone(), FakeSources::single(CHANNEL, source));
    (dir, store, channel, discoverer)
}

#[tokio::test]
async fn test_discovery_is_idempotent() {
    let source = FakeSource::with(vec![
        recording("300", "2024-03-02T01:00:00Z", "5h0m0s"),
        recording("100", "2024-03-01T08:00:00Z", "30h0m0s"),
        recording("200", "2024-03-01T20:00:00Z", "1h0m0s"),
    ]);
    let (_dir, store, channel, discoverer) = setup(source);

    let first = discoverer.discover(&channel).await.unwrap();
    let saved = std::fs::read_to_string(store.channel_path(CHANNEL)).unwrap();
    let second = discoverer.discover(&channel).await.unwrap();

    assert_eq!(first.added.len(), 3);
    assert!(second.added.is_empty());
    assert_eq!(second.retained, 3);
    assert_eq!(saved, std::fs::read_to_string(store.channel_path(CHANNEL)).unwrap());
    let vods = store.load(CHANNEL).unwrap();
    assert_eq!(vods["100"].file_name, "2024-03-01_000");
    assert_eq!(vods["200"].file_name, "2024-03-01_001");
    assert_eq!(vods["300"].file_name, "2024-03-02_000");
    assert_eq!(vods["100"].expected_splits.len(), 3);
}

#[tokio::test]
async fn test_tracked_records_keep_their_progress() {
    let source = FakeSource::with(vec![recording("100", "2024-03-01T08:00:00Z", "1h0m0s")]);
    let (_dir, store, channel, discoverer) = setup(source);
    let mut vods = VodMap::new();
    vods.insert(
        "100".into(),
        tracked("2024-03-01_000", 1_709_280_000, HOUR, 12 * HOUR, VodStatus::Fixed),
    );
    store.save(CHANNEL, &vods).unwrap();

    discoverer.discover(&channel).await.unwrap();

    assert_eq!(store.load(CHANNEL).unwrap()["100"].status, VodStatus::Fixed);
}

#[tokio::test]
async fn test_uploaded_records_missing_from_listing_are_retired() {
    let source = FakeSource::with(vec![recording("200", "2024-03-05T08:00:00Z", "1h0m0s")]);
    let (_dir, store, channel, discoverer) = setup(source);
    let mut vods = VodMap::new();
    vods.insert(
        "100".into(),
        tracked("2024-02-01_000", 1_706_774_400, HOUR, 12 * HOUR, VodStatus::Uploaded),
    );
    vods.insert(
        "150".into(),
        tracked("2024-02-02_000", 1_706_860_800, HOUR, 12 * HOUR, VodStatus::Split),
    );
    store.save(CHANNEL, &vods).unwrap();

    let report = discoverer.discover(&channel).await.unwrap();

    assert_eq!(report.retired, vec!["100"]);
    let vods = store.load(CHANNEL).unwrap();
    assert!(!vods.contains_key("100"));
    assert_eq!(vods["150"].status, VodStatus::Split);
    assert_eq!(vods["200"].status, VodStatus::NotDownloaded);
}

#[tokio::test]
async fn test_live_and_non_archive_recordings_are_ignored() {
    let mut highlight = recording("300", "2024-03-01T10:00:00Z", "10m0s");
    highlight.type_tag = "highlight".into();
    let source = FakeSource::with(vec![
        recording("100", "2024-03-01T08:00:00Z", "1h0m0s"),
        recording("200", "2024-03-01T20:00:00Z", "1h0m0s"),
        highlight,
    ]);
    source.active.lock().unwrap().insert("stream-200".into());
    let (_dir, store, channel, discoverer) = setup(source);

    let report = discoverer.discover(&channel).await.unwrap();

    assert_eq!(report.skipped_live, 1);
    assert_eq!(report.skipped_type, 1);
    let vods = store.load(CHANNEL).unwrap();
    assert_eq!(vods.len(), 1);
    assert!(vods.contains_key("100"));
}

#[tokio::test]
async fn test_window_bounds_are_inclusive() {
    let source = FakeSource::with(vec![
        recording("100", "2024-03-01T00:00:00Z", "1h0m0s"),
        recording("200", "2024-02-29T23:59:59Z", "1h0m0s"),
        recording("300", "2024-03-10T00:00:00Z", "1h0m0s"),
        recording("400", "2024-03-10T00:00:01Z", "1h0m0s"),
    ]);
    let (_dir, store, mut channel, discoverer) = setup(source);
    channel.after = Some(1_709_251_200);
    channel.before = Some(1_710_028_800);

    let report = discoverer.discover(&channel).await.unwrap();

    assert_eq!(report.skipped_window, 2);
    let ids: Vec<String> = store.load(CHANNEL).unwrap().into_keys().collect();
    assert_eq!(ids, vec!["100", "300"]);
}

#[tokio::test]
async fn test_titles_file_lists_pending_records() {
    let mut odd = recording("200", "2024-03-01T20:00:00Z", "1h0m0s");
    odd.title = "Playing <something>".into();
    let source = FakeSource::with(vec![recording("100", "2024-03-01T08:00:00Z", "1h0m0s"), odd]);
    let (_dir, _store, channel, discoverer) = setup(source);

    discoverer.discover(&channel).await.unwrap();

    let titles = std::fs::read_to_string(channel.titles_path()).unwrap();
    assert_eq!(
        titles,
        "Stream 100\n2024-03-01_000\n\nPlaying ＜something＞\n2024-03-01_001"
    );
}

#[tokio::test]
async fn test_titles_file_is_optional() {
    let source = FakeSource::with(vec![recording("100", "2024-03-01T08:00:00Z", "1h0m0s")]);
    let (_dir, _store, mut channel, discoverer) = setup(source);
    channel.comment_titles = false;

    discoverer.discover(&channel).await.unwrap();

    assert!(!channel.titles_path().exists());
}

#[tokio::test]
async fn test_bad_timestamp_leaves_state_untouched() {
    let source = FakeSource::with(vec![recording("100", "yesterday", "1h0m0s")]);
    let (_dir, store, channel, discoverer) = setup(source);

    let err = discoverer.discover(&channel).await.unwrap_err();

    assert!(matches!(err, DiscoveryError::Format { .. }));
    assert!(!store.channel_path(CHANNEL).exists());
}

#[tokio::test]
async fn test_channel_without_credentials_fails() {
    let dir = tempdir().unwrap();
    let store = JsonVodStore::new(dir.path()).unwrap();
    let discoverer = Discoverer::new(store, Arc::new(FakeSources::default()));
    let channel = ChannelContext::new("stranger", dir.path().join("recordings"), 12 * HOUR);

    let err = discoverer.discover(&channel).await.unwrap_err();

    assert!(matches!(err, DiscoveryError::Credential(_)));
}
