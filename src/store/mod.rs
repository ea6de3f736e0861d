use crate::catalog::Catalog;
use crate::config::StoreSettings;
use crate::db::{FileStore, SnapshotSink};
use crate::error::{PersistenceError, VoteError};
use crate::models::{OptionCounts, Overview, Poll, PollResults};
use crate::results::ResultsCache;
use crate::tally::TallyStore;
use crate::tasks::{FlushState, WriteCoalescer};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

/// The poll vote store: validation, live tally, cached aggregates and lazy
/// persistence behind one handle.
///
/// Construct one per process (or per test) and share it by reference.
/// Spawns its flush task on creation, so it must be built inside a tokio
/// runtime.
pub struct VoteStore {
    tally: Arc<TallyStore>,
    results: ResultsCache,
    coalescer: WriteCoalescer,
}

impl VoteStore {
    /// Loads the snapshot at `durable_path` and starts serving `catalog`.
    pub async fn init(catalog: Catalog, durable_path: impl Into<PathBuf>) -> Self {
        Self::with_sink(
            catalog,
            Arc::new(FileStore::new(durable_path)),
            StoreSettings::default(),
        )
        .await
    }

    pub async fn with_sink(
        catalog: Catalog,
        sink: Arc<dyn SnapshotSink>,
        settings: StoreSettings,
    ) -> Self {
        let initial = sink.load().await.unwrap_or_else(|e| {
            warn!("{}; starting from an empty tally", e);
            Default::default()
        });
        info!(
            "Vote store ready: {} polls in catalog, {} with recorded votes",
            catalog.len(),
            initial.len()
        );

        let tally = Arc::new(TallyStore::new(Arc::new(catalog), initial));
        let coalescer = WriteCoalescer::spawn(Arc::clone(&tally), sink, settings.flush_debounce);

        Self {
            tally,
            results: ResultsCache::new(settings.results_ttl),
            coalescer,
        }
    }

    /// Counts one vote and returns the poll's aggregate including it.
    ///
    /// Succeeds as soon as the in-memory tally is updated; writing it to disk
    /// happens later and its failures are only logged.
    pub async fn vote(&self, poll_id: &str, option: &str) -> Result<PollResults, VoteError> {
        let increment = self.tally.increment(poll_id, option).await?;
        self.coalescer.mark_dirty();

        let results = PollResults::from_counts(increment.counts);
        self.results.put(&increment.poll_id, results.clone()).await;
        Ok(results)
    }

    /// Aggregate for a poll, served from cache while it is fresh.
    pub async fn get_results(&self, poll_id: &str) -> Result<PollResults, VoteError> {
        let poll_id = self.resolve(poll_id)?;

        if let Some(results) = self.results.get_fresh(&poll_id).await {
            return Ok(results);
        }

        let results = PollResults::from_counts(self.tally.get(&poll_id).await);
        self.results.put(&poll_id, results.clone()).await;
        Ok(results)
    }

    /// Raw counts for a poll id, empty if nothing has been recorded.
    pub async fn get(&self, poll_id: &str) -> OptionCounts {
        self.tally.get(poll_id).await
    }

    /// Active polls in catalog order.
    pub fn polls(&self) -> Vec<Poll> {
        self.tally.catalog().active().cloned().collect()
    }

    pub async fn overview(&self) -> Overview {
        Overview {
            polls: self.polls(),
            votes: self.tally.snapshot().await,
        }
    }

    /// Writes the current tally to disk and waits for the write.
    pub async fn force_flush(&self) -> Result<(), PersistenceError> {
        self.coalescer.force_flush().await
    }

    pub fn flush_state(&self) -> FlushState {
        self.coalescer.state()
    }

    /// Final best-effort write. Votes cast after this are not persisted.
    pub async fn shutdown(&self) -> Result<(), PersistenceError> {
        self.coalescer.shutdown().await
    }

    // Reads accept inactive polls; only votes require an open poll.
    fn resolve(&self, poll_id: &str) -> Result<String, VoteError> {
        let poll_id = poll_id.trim();
        self.tally
            .catalog()
            .resolve(poll_id)
            .map(|poll| poll.id.clone())
            .ok_or_else(|| VoteError::UnknownPoll(poll_id.to_string()))
    }
}
