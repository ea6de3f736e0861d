use log::{info, warn};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CATALOG_PATH: &str = "data/pollsRegistry.json";
pub const DEFAULT_DATA_PATH: &str = "data/polls.json";
pub const DEFAULT_FLUSH_DEBOUNCE_MS: u64 = 5_000;
pub const DEFAULT_RESULTS_TTL_MS: u64 = 30_000;

/// Timing knobs for a [`crate::VoteStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    /// Delay between the first unsaved vote and the snapshot write.
    pub flush_debounce: Duration,
    pub results_ttl: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            flush_debounce: Duration::from_millis(DEFAULT_FLUSH_DEBOUNCE_MS),
            results_ttl: Duration::from_millis(DEFAULT_RESULTS_TTL_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub catalog_path: PathBuf,
    pub data_path: PathBuf,
    pub settings: StoreSettings,
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            catalog_path: try_load(&lookup, "POLLS_CATALOG_PATH", DEFAULT_CATALOG_PATH.into()),
            data_path: try_load(&lookup, "POLLS_DATA_PATH", DEFAULT_DATA_PATH.into()),
            settings: StoreSettings {
                flush_debounce: Duration::from_millis(try_load(
                    &lookup,
                    "POLLS_FLUSH_DEBOUNCE_MS",
                    DEFAULT_FLUSH_DEBOUNCE_MS,
                )),
                results_ttl: Duration::from_millis(try_load(
                    &lookup,
                    "POLLS_RESULTS_TTL_MS",
                    DEFAULT_RESULTS_TTL_MS,
                )),
            },
        }
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        info!("{key} not set, using default: {default:?}");
        return default;
    };

    raw.trim().parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value '{raw}': {e}; using default: {default:?}");
        default
    })
}
