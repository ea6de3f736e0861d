use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vote_tally::db::SnapshotSink;
use vote_tally::models::Snapshot;
use vote_tally::tasks::FlushState;
use vote_tally::{Catalog, Poll, PersistenceError, StoreSettings, Tally, VoteError, VoteStore};

#[derive(Default)]
struct RecordingSink {
    initial: Tally,
    writes: Mutex<Vec<Snapshot>>,
}

impl RecordingSink {
    fn with_initial(initial: Tally) -> Self {
        Self {
            initial,
            ..Default::default()
        }
    }

    fn writes(&self) -> Vec<Snapshot> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotSink for RecordingSink {
    async fn load(&self) -> Result<Tally, PersistenceError> {
        Ok(self.initial.clone())
    }

    async fn store(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        self.writes.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

struct BrokenDisk;

#[async_trait]
impl SnapshotSink for BrokenDisk {
    async fn load(&self) -> Result<Tally, PersistenceError> {
        Err(PersistenceError::ReadFailed {
            path: "polls.json".into(),
            reason: "device not ready".to_string(),
        })
    }

    async fn store(&self, _snapshot: &Snapshot) -> Result<(), PersistenceError> {
        Err(PersistenceError::WriteFailed {
            path: "polls.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only file system"),
        })
    }
}

fn catalog() -> Catalog {
    Catalog::from_polls(vec![
        Poll::new("color", "Favorite color?", &["red", "blue"]),
        Poll::new("size", "Party bus or limo?", &["bus", "limo", "either"]),
    ])
}

fn settings() -> StoreSettings {
    StoreSettings {
        flush_debounce: Duration::from_secs(5),
        results_ttl: Duration::from_secs(30),
    }
}

async fn memory_store() -> (VoteStore, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let store = VoteStore::with_sink(catalog(), sink.clone(), settings()).await;
    (store, sink)
}

#[tokio::test]
async fn color_poll_scenario() {
    let (store, _sink) = memory_store().await;

    let results = store.vote("color", "red").await.unwrap();
    assert_eq!(results.results.len(), 1);
    assert_eq!(results.results["red"], 1);
    assert_eq!(results.total, 1);

    assert_eq!(
        store.vote("color", "green").await,
        Err(VoteError::InvalidOption {
            poll_id: "color".to_string(),
            option: "green".to_string(),
        })
    );
    assert_eq!(
        store.vote("weather", "sun").await,
        Err(VoteError::UnknownPoll("weather".to_string()))
    );

    let counts = store.get("color").await;
    assert_eq!(counts.len(), 1);
    assert_eq!(counts["red"], 1);
    assert!(store.get("weather").await.is_empty());
}

#[tokio::test]
async fn total_matches_sum_of_options() {
    let (store, _sink) = memory_store().await;
    for option in ["bus", "bus", "limo", "either", "bus"] {
        store.vote("size", option).await.unwrap();
    }

    let results = store.get_results("size").await.unwrap();
    assert_eq!(results.total, results.results.values().sum::<u64>());
    assert_eq!(results.total, 5);
    assert_eq!(results.results["bus"], 3);
    assert_eq!(results.percentages["bus"], 60.0);
}

#[tokio::test(start_paused = true)]
async fn back_to_back_votes_share_one_write() {
    let (store, sink) = memory_store().await;
    store.vote("color", "red").await.unwrap();
    store.vote("size", "limo").await.unwrap();

    tokio::time::sleep(Duration::from_secs(6)).await;
    let writes = sink.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].votes["color"]["red"], 1);
    assert_eq!(writes[0].votes["size"]["limo"], 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(sink.writes().len(), 1);
    assert_eq!(store.flush_state(), FlushState::Idle);
}

#[tokio::test(start_paused = true)]
async fn results_are_cached_within_ttl() {
    let (store, _sink) = memory_store().await;
    store.vote("color", "red").await.unwrap();

    let first = store.get_results("color").await.unwrap();
    tokio::time::advance(Duration::from_secs(10)).await;
    let second = store.get_results("color").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn results_refresh_after_ttl() {
    let (store, _sink) = memory_store().await;
    store.vote("color", "red").await.unwrap();
    store.vote("color", "blue").await.unwrap();
    store.get_results("color").await.unwrap();

    tokio::time::advance(Duration::from_secs(31)).await;
    let refreshed = store.get_results("color").await.unwrap();
    assert_eq!(refreshed.results, store.get("color").await);
    assert_eq!(refreshed.total, 2);

    // The recomputed aggregate starts a new TTL window.
    tokio::time::advance(Duration::from_secs(29)).await;
    assert_eq!(store.get_results("color").await.unwrap(), refreshed);
}

#[tokio::test(start_paused = true)]
async fn vote_replaces_cached_results_mid_ttl() {
    let (store, _sink) = memory_store().await;
    store.vote("color", "red").await.unwrap();
    assert_eq!(store.get_results("color").await.unwrap().total, 1);

    tokio::time::advance(Duration::from_secs(5)).await;
    let voted = store.vote("color", "blue").await.unwrap();
    let read = store.get_results("color").await.unwrap();

    assert_eq!(read, voted);
    assert_eq!(read.total, 2);
    assert_eq!(read.results["blue"], 1);
}

#[tokio::test]
async fn results_for_unknown_poll_fail() {
    let (store, _sink) = memory_store().await;
    assert_eq!(
        store.get_results("weather").await,
        Err(VoteError::UnknownPoll("weather".to_string()))
    );
}

#[tokio::test]
async fn results_of_unvoted_poll_are_empty() {
    let (store, _sink) = memory_store().await;
    let results = store.get_results("color").await.unwrap();
    assert!(results.results.is_empty());
    assert_eq!(results.total, 0);
}

#[tokio::test]
async fn votes_succeed_while_disk_is_broken() {
    let store = VoteStore::with_sink(catalog(), Arc::new(BrokenDisk), settings()).await;

    store.vote("color", "red").await.unwrap();
    assert!(store.force_flush().await.is_err());

    let results = store.vote("color", "red").await.unwrap();
    assert_eq!(results.total, 2);
    assert_eq!(results.results["red"], 2);
}

#[tokio::test]
async fn force_flush_writes_current_tally_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("polls.json");
    let store = VoteStore::init(catalog(), &path).await;

    store.vote("color", "red").await.unwrap();
    store.vote("color", "blue").await.unwrap();
    store.vote("size", "bus").await.unwrap();
    store.force_flush().await.unwrap();

    let written: Snapshot = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(written.votes, store.overview().await.votes);
}

#[tokio::test]
async fn restart_resumes_from_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("polls.json");

    let store = VoteStore::init(catalog(), &path).await;
    store.vote("color", "blue").await.unwrap();
    store.vote("color", "blue").await.unwrap();
    store.shutdown().await.unwrap();

    let restarted = VoteStore::init(catalog(), &path).await;
    let results = restarted.vote("color", "blue").await.unwrap();
    assert_eq!(results.results["blue"], 3);
}

#[tokio::test]
async fn unwritable_snapshot_path_does_not_affect_votes() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, "").unwrap();
    let store = VoteStore::init(catalog(), blocker.join("polls.json")).await;

    let results = store.vote("size", "either").await.unwrap();
    assert_eq!(results.total, 1);
    assert!(matches!(
        store.force_flush().await,
        Err(PersistenceError::WriteFailed { .. })
    ));
    assert_eq!(store.vote("size", "either").await.unwrap().total, 2);
}

#[tokio::test]
async fn corrupt_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("polls.json");
    std::fs::write(&path, "not json at all").unwrap();

    let store = VoteStore::init(catalog(), &path).await;
    assert!(store.get("color").await.is_empty());
    assert_eq!(store.vote("color", "red").await.unwrap().total, 1);
}

#[tokio::test]
async fn empty_catalog_rejects_every_vote() {
    let store = VoteStore::with_sink(
        Catalog::empty(),
        Arc::new(RecordingSink::default()),
        settings(),
    )
    .await;

    assert_eq!(
        store.vote("color", "red").await,
        Err(VoteError::UnknownPoll("color".to_string()))
    );
    assert!(store.polls().is_empty());
}

#[tokio::test]
async fn stored_tally_is_loaded_on_start() {
    let initial = Tally::from([(
        "color".to_string(),
        [("red".to_string(), 41)].into_iter().collect(),
    )]);
    let sink = Arc::new(RecordingSink::with_initial(initial));
    let store = VoteStore::with_sink(catalog(), sink, settings()).await;

    assert_eq!(store.vote("color", "red").await.unwrap().results["red"], 42);
}

#[tokio::test]
async fn polls_lists_active_catalog_entries_in_order() {
    let mut closed = Poll::new("closed", "Closed?", &["yes"]);
    closed.active = false;
    let catalog = Catalog::from_polls(vec![
        Poll::new("b", "Second?", &["x"]),
        closed,
        Poll::new("a", "First?", &["y"]),
    ]);
    let store = VoteStore::with_sink(catalog, Arc::new(RecordingSink::default()), settings()).await;

    let ids: Vec<_> = store.polls().into_iter().map(|poll| poll.id).collect();
    assert_eq!(ids, vec!["b", "a"]);
    assert!(store.get_results("closed").await.is_ok());
}
