use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use harvest_core::{CycleSettings, ListedItem, Phase, ThreadSnapshot};
use harvest_engine::{
    read_records, verify_payload_digest, AssetFetchDelegate, DelegateError, FeedClient, FeedError,
    FeedFailureKind, HarvestError, HarvestSettings, Harvester, MediaHandoff, Pacer, RecordType,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

/// Serves one scripted listing per cycle and records every call.
struct ScriptedFeed {
    listings: VecDeque<Result<Vec<ListedItem>, FeedError>>,
    threads: Vec<ThreadSnapshot>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFeed {
    fn new(listings: Vec<Vec<ListedItem>>, threads: Vec<ThreadSnapshot>) -> Self {
        Self {
            listings: listings.into_iter().map(Ok).collect(),
            threads,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl FeedClient for ScriptedFeed {
    fn list_recent(&mut self, limit: usize) -> Result<Vec<ListedItem>, FeedError> {
        self.calls.lock().unwrap().push(format!("list {limit}"));
        self.listings.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn fetch_details(&mut self, post_id: &str) -> Result<ThreadSnapshot, FeedError> {
        self.calls.lock().unwrap().push(format!("fetch {post_id}"));
        self.threads
            .iter()
            .find(|t| t.post_id() == post_id)
            .cloned()
            .ok_or_else(|| FeedError::new(FeedFailureKind::HttpStatus(404), "not found"))
    }
}

/// Records handoffs, including the URL list contents at call time.
struct RecordingDelegate {
    fail: bool,
    handoffs: Arc<Mutex<Vec<(MediaHandoff, String)>>>,
}

impl AssetFetchDelegate for RecordingDelegate {
    fn fetch_assets(&mut self, handoff: &MediaHandoff) -> Result<(), DelegateError> {
        let listed = fs::read_to_string(&handoff.url_list).unwrap();
        self.handoffs
            .lock()
            .unwrap()
            .push((handoff.clone(), listed));
        if self.fail {
            Err(DelegateError::ExitStatus {
                program: "wget".to_string(),
                code: Some(8),
            })
        } else {
            Ok(())
        }
    }
}

/// Virtual clock: sleeping advances time, nothing blocks.
struct FakePacer {
    now: DateTime<Utc>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl Pacer for FakePacer {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.now += chrono::Duration::from_std(duration).unwrap();
    }
}

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 3, 13, 11, 27, 29).unwrap()
}

fn settings(dir: &Path, max_session_secs: u64) -> HarvestSettings {
    HarvestSettings {
        cycle: CycleSettings {
            item_limit: 60,
            max_session: Duration::from_secs(max_session_secs),
        },
        poll_interval: Duration::from_secs(100),
        output_dir: dir.join("warc"),
        media_dir: dir.join("media"),
        locality: "Aarhus".to_string(),
        latitude: 56.15,
        longitude: 10.216667,
        share_url_template: "https://share.example/post?postId={post_id}".to_string(),
        operator: None,
    }
}

fn thread(id: &str, updated_at: &str, image: Option<&str>) -> ThreadSnapshot {
    let mut details = json!({ "post_id": id, "updated_at": updated_at });
    if let Some(url) = image {
        details["image_approved"] = json!(true);
        details["image_url"] = json!(url);
    }
    ThreadSnapshot::new(id, json!({ "details": details, "replies": [] }))
}

fn listed(items: &[(&str, &str)]) -> Vec<ListedItem> {
    items
        .iter()
        .map(|(id, ts)| ListedItem::new(*id, *ts))
        .collect()
}

fn pacer() -> (FakePacer, Arc<Mutex<Vec<Duration>>>) {
    let sleeps = Arc::new(Mutex::new(Vec::new()));
    (
        FakePacer {
            now: start_time(),
            sleeps: sleeps.clone(),
        },
        sleeps,
    )
}

fn delegate(fail: bool) -> (RecordingDelegate, Arc<Mutex<Vec<(MediaHandoff, String)>>>) {
    let handoffs = Arc::new(Mutex::new(Vec::new()));
    (
        RecordingDelegate {
            fail,
            handoffs: handoffs.clone(),
        },
        handoffs,
    )
}

#[test]
fn fetches_only_new_and_changed_items_across_cycles() {
    init_logging();
    let temp = TempDir::new().unwrap();
    const T0: &str = "2018-03-13T11:27:29.123Z";
    const T1: &str = "2018-03-13T11:30:00.000Z";
    let feed = ScriptedFeed::new(
        vec![
            listed(&[("p1", T0)]),
            listed(&[("p1", T0), ("p2", T0)]),
            listed(&[("p1", T1), ("p2", T0)]),
        ],
        vec![thread("p1", T1, None), thread("p2", T0, None)],
    );
    let calls = feed.calls.clone();
    let (pacer, sleeps) = pacer();
    let (delegate, handoffs) = delegate(false);

    // Cycles start at 0s, 100s, 200s; the check at 300s ends the run.
    let mut harvester = Harvester::new(settings(temp.path(), 250), feed, delegate, pacer);
    let summary = harvester.run().unwrap();

    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            "list 60", "fetch p1", "list 60", "fetch p2", "list 60", "fetch p1",
        ]
    );
    assert_eq!(summary.stats.cycles, 3);
    assert_eq!(summary.stats.archived, 3);
    assert_eq!(summary.stats.archives_written, 3);
    assert_eq!(summary.archives.len(), 3);
    assert_eq!(sleeps.lock().unwrap().len(), 3);
    assert!(handoffs.lock().unwrap().is_empty());
    assert_eq!(harvester.state().phase(), Phase::Terminated);

    let names: Vec<_> = summary
        .archives
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "Aarhus_20180313_112729.warc",
            "Aarhus_20180313_112909.warc",
            "Aarhus_20180313_113049.warc",
        ]
    );
}

#[test]
fn empty_listing_writes_no_archive() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let feed = ScriptedFeed::new(vec![Vec::new()], Vec::new());
    let (pacer, _) = pacer();
    let (delegate, handoffs) = delegate(false);

    let mut harvester = Harvester::new(settings(temp.path(), 0), feed, delegate, pacer);
    let summary = harvester.run().unwrap();

    assert_eq!(summary.stats.cycles, 1);
    assert!(summary.archives.is_empty());
    assert!(!temp.path().join("warc").exists());
    assert!(handoffs.lock().unwrap().is_empty());
}

#[test]
fn archive_contains_fetched_threads_with_valid_digests() {
    init_logging();
    let temp = TempDir::new().unwrap();
    const T0: &str = "2018-03-13T11:27:29.123Z";
    let feed = ScriptedFeed::new(
        vec![listed(&[("p1", T0), ("p2", T0)])],
        vec![thread("p1", T0, None), thread("p2", T0, None)],
    );
    let (pacer, _) = pacer();
    let (delegate, _) = delegate(false);

    let mut harvester = Harvester::new(settings(temp.path(), 0), feed, delegate, pacer);
    let summary = harvester.run().unwrap();

    let bytes = fs::read(&summary.archives[0]).unwrap();
    let records = read_records(&bytes).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].record_type(), Some(RecordType::Warcinfo));
    assert_eq!(records[0].header("WARC-Date"), Some("2018-03-13T11:27:29Z"));
    assert_eq!(
        records[1].header("WARC-Target-URI"),
        Some("https://share.example/post?postId=p1")
    );
    assert_eq!(
        records[2].header("WARC-Target-URI"),
        Some("https://share.example/post?postId=p2")
    );
    assert!(records[1..]
        .iter()
        .all(|r| verify_payload_digest(r) == Some(true)));
}

#[test]
fn malformed_timestamp_drops_only_that_thread() {
    init_logging();
    let temp = TempDir::new().unwrap();
    const T0: &str = "2018-03-13T11:27:29.123Z";
    let feed = ScriptedFeed::new(
        vec![listed(&[("bad", T0), ("good", T0)])],
        vec![
            thread("bad", "2018-03-13 11:27:29Z", Some("//img.example/bad.jpg")),
            thread("good", T0, Some("//img.example/good.jpg")),
        ],
    );
    let (pacer, _) = pacer();
    let (delegate, handoffs) = delegate(false);

    let mut harvester = Harvester::new(settings(temp.path(), 0), feed, delegate, pacer);
    let summary = harvester.run().unwrap();

    assert_eq!(summary.stats.archived, 1);
    assert_eq!(summary.stats.dropped, 1);
    let records = read_records(&fs::read(&summary.archives[0]).unwrap()).unwrap();
    assert_eq!(records.len(), 2);

    let handoffs = handoffs.lock().unwrap();
    assert_eq!(handoffs.len(), 1);
    assert_eq!(handoffs[0].1, "http://img.example/good.jpg\n");
}

#[test]
fn media_handoff_uses_session_name_and_cleans_up_on_failure() {
    init_logging();
    let temp = TempDir::new().unwrap();
    const T0: &str = "2018-03-13T11:27:29.123Z";
    let feed = ScriptedFeed::new(
        vec![listed(&[("p1", T0), ("p2", T0)])],
        vec![
            thread("p1", T0, Some("//img.example/a.jpg")),
            thread("p2", T0, Some("https://img.example/b.jpg")),
        ],
    );
    let (pacer, sleeps) = pacer();
    let (delegate, handoffs) = delegate(true);

    let mut harvester = Harvester::new(settings(temp.path(), 0), feed, delegate, pacer);
    let summary = harvester.run().unwrap();

    assert_eq!(summary.stats.media_handoffs, 1);
    assert_eq!(summary.stats.media_failures, 1);
    // A failed delegate does not stop the loop from pacing on.
    assert_eq!(sleeps.lock().unwrap().len(), 1);

    let handoffs = handoffs.lock().unwrap();
    let (handoff, listed) = &handoffs[0];
    assert_eq!(listed, "http://img.example/a.jpg\nhttps://img.example/b.jpg\n");
    assert_eq!(handoff.name, "Aarhus_20180313_112729_media");
    assert_eq!(handoff.dest_dir, temp.path().join("media"));
    assert!(!handoff.url_list.exists());
    assert_eq!(fs::read_dir(temp.path().join("media")).unwrap().count(), 0);
}

#[test]
fn transport_failure_ends_the_run() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let mut feed = ScriptedFeed::new(Vec::new(), Vec::new());
    feed.listings
        .push_back(Err(FeedError::new(FeedFailureKind::Timeout, "timed out")));
    let (pacer, _) = pacer();
    let (delegate, _) = delegate(false);

    let mut harvester = Harvester::new(settings(temp.path(), 1000), feed, delegate, pacer);
    let err = harvester.run().unwrap_err();

    match err {
        HarvestError::Feed(feed_err) => assert_eq!(feed_err.kind, FeedFailureKind::Timeout),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn detail_fetch_failure_ends_the_run_without_writing() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let feed = ScriptedFeed::new(
        vec![listed(&[("missing", "2018-03-13T11:27:29.123Z")])],
        Vec::new(),
    );
    let (pacer, _) = pacer();
    let (delegate, _) = delegate(false);

    let mut harvester = Harvester::new(settings(temp.path(), 1000), feed, delegate, pacer);
    assert!(matches!(harvester.run(), Err(HarvestError::Feed(_))));
    assert!(!temp.path().join("warc").exists());
}

#[test]
fn post_id_with_line_break_stays_inside_target_uri() {
    init_logging();
    let temp = TempDir::new().unwrap();
    const T0: &str = "2018-03-13T11:27:29.123Z";
    const ID: &str = "p1\r\nWARC-Type: warcinfo";
    let feed = ScriptedFeed::new(vec![listed(&[(ID, T0)])], vec![thread(ID, T0, None)]);
    let (pacer, _) = pacer();
    let (delegate, _) = delegate(false);

    let mut harvester = Harvester::new(settings(temp.path(), 0), feed, delegate, pacer);
    let summary = harvester.run().unwrap();

    let records = read_records(&fs::read(&summary.archives[0]).unwrap()).unwrap();
    assert_eq!(records.len(), 2);
    let response = &records[1];
    assert_eq!(
        response.header("WARC-Target-URI"),
        Some("https://share.example/post?postId=p1%0D%0AWARC-Type%3A+warcinfo")
    );
    let types: Vec<_> = response
        .headers()
        .iter()
        .filter(|(name, _)| name == "WARC-Type")
        .map(|(_, value)| value.as_str())
        .collect();
    assert_eq!(types, vec!["response"]);
    assert_eq!(verify_payload_digest(response), Some(true));
}

#[test]
fn multi_line_locality_ends_the_run_before_writing() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let feed = ScriptedFeed::new(vec![Vec::new()], Vec::new());
    let (pacer, _) = pacer();
    let (delegate, _) = delegate(false);
    let mut settings = settings(temp.path(), 0);
    settings.locality = "Aarhus\nsoftware: other".to_string();

    let mut harvester = Harvester::new(settings, feed, delegate, pacer);
    assert!(matches!(harvester.run(), Err(HarvestError::SessionInfo(_))));
    assert!(!temp.path().join("warc").exists());
}
