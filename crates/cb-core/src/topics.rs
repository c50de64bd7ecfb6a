//! Recent-topics ledger.
//!
//! A fixed-capacity FIFO of topic tags recently posted about, fed back into
//! the generation prompt so the bot does not repeat itself. The ledger itself
//! is pure; [`RecentTopics::load`] and [`RecentTopics::save`] persist it as a
//! flat JSON array.

use std::collections::VecDeque;
use std::path::Path;

use crate::error::{AppError, Result};
use crate::fitter::extract_hashtags;

pub const DEFAULT_CAPACITY: usize = 10;

/// Topic recorded for a post that carries no hashtag.
pub const UNKNOWN_TOPIC: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentTopics {
    capacity: usize,
    topics: VecDeque<String>,
}

impl RecentTopics {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            topics: VecDeque::with_capacity(capacity),
        }
    }

    /// Rebuilds a ledger from stored topics, oldest first.
    pub fn from_topics<I>(capacity: usize, topics: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut ledger = Self::new(capacity);
        for topic in topics {
            ledger.record(&topic);
        }
        ledger
    }

    /// Appends `topic` unless already present, evicting the oldest entry when
    /// the ledger is full. Returns the evicted topic, if any.
    pub fn record(&mut self, topic: &str) -> Option<String> {
        if self.capacity == 0 || self.contains(topic) {
            return None;
        }
        self.topics.push_back(topic.to_string());
        if self.topics.len() > self.capacity {
            self.topics.pop_front()
        } else {
            None
        }
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Loads the ledger from `path`; a missing file yields an empty ledger.
    pub fn load(path: &Path, capacity: usize) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new(capacity));
        }
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::StorageError(format!("reading {}: {e}", path.display()))
        })?;
        let topics: Vec<String> = serde_json::from_str(&raw).map_err(|e| {
            AppError::StorageError(format!("parsing {}: {e}", path.display()))
        })?;
        Ok(Self::from_topics(capacity, topics))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let topics: Vec<&str> = self.iter().collect();
        let raw = serde_json::to_string(&topics)
            .map_err(|e| AppError::StorageError(format!("encoding topics: {e}")))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::StorageError(format!("creating {}: {e}", parent.display()))
            })?;
        }
        std::fs::write(path, raw).map_err(|e| {
            AppError::StorageError(format!("writing {}: {e}", path.display()))
        })
    }
}

impl Default for RecentTopics {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// The first hashtag of a post, without its `#`.
pub fn main_topic(text: &str) -> String {
    extract_hashtags(text)
        .into_iter()
        .next()
        .map(|tag| tag.trim_start_matches('#').to_string())
        .unwrap_or_else(|| UNKNOWN_TOPIC.to_string())
}
