//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the engine.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ContentItem, GenerationPrompt, Published};

/// Persistence contract for the content queue.
///
/// Status-changing calls return `Ok(false)` when the id is unknown or the item
/// is not in a state the transition accepts; they never fail for that reason.
/// Writes store text verbatim and reject blank text with `ValidationError`.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ContentRepo: Send + Sync {
    // Queue writes
    async fn insert(&self, content: &str) -> Result<i64>;
    async fn insert_many(&self, contents: &[String]) -> Result<usize>;
    async fn update_content(&self, id: i64, content: &str) -> Result<bool>;

    // Queue reads
    async fn get(&self, id: i64) -> Result<Option<ContentItem>>;
    async fn list_pending(&self) -> Result<Vec<ContentItem>>;
    async fn list_recent(&self, limit: i64) -> Result<Vec<ContentItem>>;
    async fn next_authorized(&self) -> Result<Option<ContentItem>>;
    async fn count(&self) -> Result<i64>;

    // State transitions
    async fn authorize(&self, id: i64) -> Result<bool>;
    async fn remove(&self, id: i64) -> Result<bool>;
    async fn mark_posted(&self, id: i64) -> Result<bool>;

    // Retention
    async fn cleanup_older_than(&self, days: u32) -> Result<u64>;
    async fn enforce_capacity(&self, max_items: u64) -> Result<u64>;
    async fn compact(&self) -> Result<()>;
}

/// Generative text and image contract.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &GenerationPrompt) -> Result<String>;
    /// Returns `count` hashtags for `text`, each prefixed with `#`.
    async fn generate_hashtags(&self, text: &str, count: usize) -> Result<Vec<String>>;
    /// Returns a URL where the generated image can be fetched.
    async fn generate_image(&self, description: &str) -> Result<String>;
    async fn download_image(&self, url: &str) -> Result<Vec<u8>>;
}

/// Social network posting contract.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, text: &str) -> Result<Published>;
    async fn publish_with_image(&self, text: &str, image: Vec<u8>) -> Result<Published>;
}
