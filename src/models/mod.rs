use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-option vote counts for a single poll.
pub type OptionCounts = BTreeMap<String, u64>;

/// Vote counts for every poll that has received at least one vote.
pub type Tally = BTreeMap<String, OptionCounts>;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Poll {
    pub fn new(id: impl Into<String>, question: impl Into<String>, options: &[&str]) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            options: options.iter().map(|option| option.to_string()).collect(),
            active: true,
        }
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|candidate| candidate == option)
    }
}

/// The persisted form of the tally. Always written whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub votes: Tally,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl Snapshot {
    pub fn new(votes: Tally) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            votes,
        }
    }
}

/// Aggregate view of one poll's votes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResults {
    pub results: OptionCounts,
    pub total: u64,
    pub percentages: BTreeMap<String, f64>,
    pub computed_at: DateTime<Utc>,
}

impl PollResults {
    pub fn from_counts(results: OptionCounts) -> Self {
        let total = results.values().sum();
        let percentages = results
            .iter()
            .map(|(option, count)| (option.clone(), percentage(*count, total)))
            .collect();

        Self {
            results,
            total,
            percentages,
            computed_at: Utc::now(),
        }
    }
}

// One decimal place, 0.0 when nobody has voted.
fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 * 1000.0 / total as f64).round() / 10.0
}

/// Active polls together with every recorded vote.
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub polls: Vec<Poll>,
    pub votes: Tally,
}
