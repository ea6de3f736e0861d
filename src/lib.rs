pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod results;
pub mod store;
pub mod tally;
pub mod tasks;

pub use catalog::Catalog;
pub use config::{Config, StoreSettings};
pub use error::{CatalogError, PersistenceError, VoteError};
pub use models::{OptionCounts, Poll, PollResults, Tally};
pub use store::VoteStore;
