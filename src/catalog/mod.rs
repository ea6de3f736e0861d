use crate::error::CatalogError;
use crate::models::Poll;
use lazy_static::lazy_static;
use log::{error, info, warn};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;

lazy_static! {
    static ref NON_ALPHANUMERIC: Regex = Regex::new("[^a-z0-9]+").unwrap();
    static ref FILLER_ID: Regex = Regex::new("(?i)^autofill_").unwrap();
    static ref FILLER_QUESTION: Regex = Regex::new("(?i)^auto-?fill poll").unwrap();
}

/// Lowercases and collapses every run of non-alphanumerics into a single dash.
/// An empty question slugs as `misc`; a punctuation-only one slugs as empty.
pub fn slugify(text: &str) -> String {
    let text = if text.is_empty() { "misc" } else { text };
    let lowered = text.to_lowercase();
    let slug = NON_ALPHANUMERIC.replace_all(&lowered, "-");
    slug.trim_matches('-').to_string()
}

/// The fixed set of polls this process accepts votes for.
///
/// Built once at startup and never refreshed; new polls need a restart.
#[derive(Debug, Default)]
pub struct Catalog {
    polls: Vec<Poll>,
    by_id: HashMap<String, usize>,
    // Legacy clients post a slug of the question instead of the id.
    // Only active polls are indexed.
    by_slug: HashMap<String, usize>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reads the catalog from a JSON array of polls.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let unavailable = |reason: String| CatalogError::Unavailable {
            path: path.to_path_buf(),
            reason,
        };

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let polls: Vec<Poll> = serde_json::from_str(&raw).map_err(|e| unavailable(e.to_string()))?;

        let catalog = Self::from_polls(polls);
        info!("Loaded {} polls from catalog {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Like [`Catalog::load`], but an unreadable catalog yields an empty one and
    /// every vote is rejected.
    pub async fn load_or_empty(path: impl AsRef<Path>) -> Self {
        match Self::load(path).await {
            Ok(catalog) => catalog,
            Err(e) => {
                error!("{}; serving no polls", e);
                Self::empty()
            }
        }
    }

    pub fn from_polls(polls: impl IntoIterator<Item = Poll>) -> Self {
        let mut catalog = Self::empty();

        for poll in polls {
            if is_filler(&poll) {
                continue;
            }
            if let Err(reason) = validate(&poll) {
                warn!("Skipping catalog entry {}: {}", poll.id, reason);
                continue;
            }
            if catalog.by_id.contains_key(&poll.id) {
                warn!("Skipping duplicate catalog entry {}", poll.id);
                continue;
            }

            let index = catalog.polls.len();
            catalog.by_id.insert(poll.id.clone(), index);
            let slug = slugify(&poll.question);
            if poll.active && !slug.is_empty() {
                if let Some(existing) = catalog.by_slug.get(&slug) {
                    warn!(
                        "Question slug '{}' of poll {} already maps to poll {}",
                        slug, poll.id, catalog.polls[*existing].id
                    );
                } else {
                    catalog.by_slug.insert(slug, index);
                }
            }
            catalog.polls.push(poll);
        }

        catalog
    }

    pub fn len(&self) -> usize {
        self.polls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }

    /// Every poll in catalog order, inactive ones included.
    pub fn all(&self) -> &[Poll] {
        &self.polls
    }

    pub fn active(&self) -> impl Iterator<Item = &Poll> {
        self.polls.iter().filter(|poll| poll.active)
    }

    pub fn get(&self, poll_id: &str) -> Option<&Poll> {
        self.by_id.get(poll_id).map(|index| &self.polls[*index])
    }

    /// Exact id lookup over every poll, then the deprecated question-slug
    /// lookup over active ones.
    pub fn resolve(&self, poll_id: &str) -> Option<&Poll> {
        self.get(poll_id).or_else(|| self.resolve_slug(poll_id))
    }

    /// Like [`Catalog::resolve`], but only ever yields an active poll. A
    /// closed poll whose id matches still lets the slug lookup run.
    pub fn resolve_active(&self, poll_id: &str) -> Option<&Poll> {
        self.get(poll_id)
            .filter(|poll| poll.active)
            .or_else(|| self.resolve_slug(poll_id))
    }

    fn resolve_slug(&self, poll_id: &str) -> Option<&Poll> {
        let poll = self.by_slug.get(poll_id).map(|index| &self.polls[*index])?;
        warn!(
            "Resolved poll '{}' to {} through the deprecated question slug lookup",
            poll_id, poll.id
        );
        Some(poll)
    }
}

fn is_filler(poll: &Poll) -> bool {
    FILLER_ID.is_match(&poll.id) || FILLER_QUESTION.is_match(&poll.question)
}

fn validate(poll: &Poll) -> Result<(), String> {
    if poll.options.is_empty() {
        return Err("no options".to_string());
    }
    let mut seen = HashSet::new();
    for option in &poll.options {
        if !seen.insert(option.as_str()) {
            return Err(format!("duplicate option '{}'", option));
        }
    }
    Ok(())
}
