use crate::catalog::Catalog;
use crate::error::VoteError;
use crate::models::{OptionCounts, Tally};
use log::warn;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Live vote counts. While the process runs this is the source of truth;
/// the snapshot file only ever trails it.
pub struct TallyStore {
    catalog: Arc<Catalog>,
    votes: RwLock<Tally>,
}

/// Outcome of a counted vote, taken under the same lock as the increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    pub poll_id: String,
    pub counts: OptionCounts,
    pub total: u64,
}

impl TallyStore {
    pub fn new(catalog: Arc<Catalog>, initial: Tally) -> Self {
        let votes = retain_known_options(&catalog, initial);
        Self {
            catalog,
            votes: RwLock::new(votes),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Counts for one poll, empty if it has no votes yet.
    pub async fn get(&self, poll_id: &str) -> OptionCounts {
        self.votes.read().await.get(poll_id).cloned().unwrap_or_default()
    }

    /// Adds exactly one vote. The poll must be active and the option one of
    /// its own; nothing is mutated otherwise.
    pub async fn increment(&self, poll_id: &str, option: &str) -> Result<Increment, VoteError> {
        let poll_id = poll_id.trim();
        let option = option.trim();

        let poll = self
            .catalog
            .resolve_active(poll_id)
            .ok_or_else(|| VoteError::UnknownPoll(poll_id.to_string()))?;
        if !poll.has_option(option) {
            return Err(VoteError::InvalidOption {
                poll_id: poll.id.clone(),
                option: option.to_string(),
            });
        }

        let mut votes = self.votes.write().await;
        let counts = votes.entry(poll.id.clone()).or_default();
        *counts.entry(option.to_string()).or_insert(0) += 1;

        Ok(Increment {
            poll_id: poll.id.clone(),
            total: counts.values().sum(),
            counts: counts.clone(),
        })
    }

    /// A consistent copy of every count. The lock is released before the
    /// caller does anything slow with it.
    pub async fn snapshot(&self) -> Tally {
        self.votes.read().await.clone()
    }
}

// Stored counts for options a catalog poll no longer offers would break the
// tally invariant. Polls missing from the catalog are kept so that the next
// flush does not erase their history.
fn retain_known_options(catalog: &Catalog, mut votes: Tally) -> Tally {
    for (poll_id, counts) in votes.iter_mut() {
        let Some(poll) = catalog.get(poll_id) else {
            continue;
        };
        let before = counts.len();
        counts.retain(|option, _| poll.has_option(option));
        if counts.len() != before {
            warn!(
                "Dropped {} stored option(s) of poll {} that are not in the catalog",
                before - counts.len(),
                poll_id
            );
        }
    }
    votes
}
