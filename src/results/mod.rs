use crate::models::PollResults;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct CachedAggregate {
    stored_at: Instant,
    results: PollResults,
}

/// Short-lived aggregates for hot polls.
///
/// Entries are replaced on every vote for their poll, so staleness is bounded
/// by the TTL for other readers and is zero for the voter.
pub struct ResultsCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedAggregate>>,
}

impl ResultsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The cached aggregate if it is younger than the TTL.
    pub async fn get_fresh(&self, poll_id: &str) -> Option<PollResults> {
        let entries = self.entries.lock().await;
        let cached = entries.get(poll_id)?;
        if cached.stored_at.elapsed() < self.ttl {
            Some(cached.results.clone())
        } else {
            None
        }
    }

    /// Stores a freshly computed aggregate.
    ///
    /// Counts only grow, so an aggregate with a smaller total than the one
    /// already cached was computed earlier and loses the race. Its arrival
    /// still refreshes the entry's age.
    pub async fn put(&self, poll_id: &str, results: PollResults) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get_mut(poll_id) {
            Some(cached) if cached.results.total > results.total => {
                cached.stored_at = now;
            }
            Some(cached) => {
                cached.stored_at = now;
                cached.results = results;
            }
            None => {
                entries.insert(
                    poll_id.to_string(),
                    CachedAggregate {
                        stored_at: now,
                        results,
                    },
                );
            }
        }
    }
}
