//! # cb-engine
//!
//! Orchestration of the content queue: composing posts with the generator,
//! publishing authorized items and keeping the store within its retention
//! bounds. The engine owns its collaborators; nothing here is global.

pub mod maintenance;
pub mod prompt;
pub mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;

use cb_core::error::{AppError, Result};
use cb_core::fitter::{extract_hashtags, fit_post, weighted_len};
use cb_core::models::{ContentItem, Transition};
use cb_core::topics::{main_topic, RecentTopics};
use cb_core::traits::{ContentGenerator, ContentRepo, Publisher};
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{debug, error, info, warn};

pub use maintenance::{run_maintenance, MaintenancePolicy, MaintenanceReport};
pub use scheduler::SleepWindow;

/// Tunables for composing and publishing.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub persona: String,
    pub themes: Vec<String>,
    pub max_post_length: usize,
    pub hashtag_count: usize,
    pub fallback_hashtags: Vec<String>,
    pub image_probability: f64,
    /// Where the recent-topics ledger is persisted; `None` keeps it in memory.
    pub topics_path: Option<PathBuf>,
    pub maintenance: MaintenancePolicy,
    pub sleep: SleepWindow,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            persona: "Write a short post about {theme}. Avoid: {recent_topics}.".to_string(),
            themes: vec!["technology".to_string()],
            max_post_length: 280,
            hashtag_count: 3,
            fallback_hashtags: vec!["#tech".into(), "#innovation".into(), "#future".into()],
            image_probability: 0.1,
            topics_path: None,
            maintenance: MaintenancePolicy::default(),
            sleep: SleepWindow::default(),
        }
    }
}

/// Result of one publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Nothing authorized in the queue.
    Idle,
    Posted {
        id: i64,
        remote_id: String,
        with_image: bool,
    },
    /// The item stays authorized and is retried next cycle.
    Failed { id: i64, reason: String },
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub generated: Option<i64>,
    pub publish: Option<PublishOutcome>,
    pub maintenance: MaintenanceReport,
}

pub struct Engine {
    repo: Arc<dyn ContentRepo>,
    generator: Arc<dyn ContentGenerator>,
    publisher: Arc<dyn Publisher>,
    topics: RecentTopics,
    options: EngineOptions,
}

impl Engine {
    pub fn new(
        repo: Arc<dyn ContentRepo>,
        generator: Arc<dyn ContentGenerator>,
        publisher: Arc<dyn Publisher>,
        topics: RecentTopics,
        options: EngineOptions,
    ) -> Self {
        Self {
            repo,
            generator,
            publisher,
            topics,
            options,
        }
    }

    pub fn repo(&self) -> &Arc<dyn ContentRepo> {
        &self.repo
    }

    pub fn topics(&self) -> &RecentTopics {
        &self.topics
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    fn pick_theme(&self) -> Result<String> {
        self.options
            .themes
            .choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| AppError::ConfigError("no content themes configured".into()))
    }

    fn remember_topic(&mut self, topic: &str) {
        if let Some(evicted) = self.topics.record(topic) {
            debug!(%evicted, "topic left the recent ledger");
        }
        if let Some(path) = &self.options.topics_path {
            if let Err(e) = self.topics.save(path) {
                warn!(error = %e, "could not persist recent topics");
            }
        }
    }

    /// Generates one post and fits it to the length limit.
    ///
    /// Hashtags are requested separately only when the generated text has
    /// none; if that call fails the fallback tags are used instead.
    pub async fn compose_post(&mut self) -> Result<String> {
        let theme = self.pick_theme()?;
        let prompt = prompt::build_prompt(&self.options.persona, &theme, &self.topics);
        debug!(%theme, "requesting post text");

        let raw = self.generator.generate_text(&prompt).await?;
        let raw = raw.trim().to_string();
        if raw.is_empty() {
            return Err(AppError::GenerationError("generator returned no text".into()));
        }
        self.remember_topic(&main_topic(&raw));

        let extra = if extract_hashtags(&raw).is_empty() {
            match self
                .generator
                .generate_hashtags(&raw, self.options.hashtag_count)
                .await
            {
                Ok(tags) if !tags.is_empty() => tags,
                Ok(_) => self.options.fallback_hashtags.clone(),
                Err(e) => {
                    warn!(error = %e, "hashtag generation failed, using fallback tags");
                    self.options.fallback_hashtags.clone()
                }
            }
        } else {
            Vec::new()
        };

        Ok(fit_post(&raw, &extra, self.options.max_post_length))
    }

    /// Composes a post and queues it as pending.
    pub async fn generate_and_store(&mut self) -> Result<i64> {
        let post = self.compose_post().await?;
        let id = self.repo.insert(&post).await?;
        info!(id, "queued generated post");
        Ok(id)
    }

    /// Composes up to `count` posts; individual failures are logged and skipped.
    pub async fn generate_batch(&mut self, count: usize) -> Vec<String> {
        let mut posts = Vec::with_capacity(count);
        for n in 1..=count {
            match self.compose_post().await {
                Ok(post) => posts.push(post),
                Err(e) => error!(error = %e, n, "post generation failed"),
            }
        }
        posts
    }

    /// Fetches one item, failing with `NotFound` for an unknown id.
    pub async fn item(&self, id: i64) -> Result<ContentItem> {
        self.repo
            .get(id)
            .await?
            .ok_or(AppError::NotFound { id })
    }

    /// Queues hand-written text. Text that would not fit a post is refused,
    /// since it could never be published.
    pub async fn queue_manual(&self, text: &str) -> Result<i64> {
        let limit = self.options.max_post_length;
        let len = weighted_len(text.trim());
        if len > limit {
            return Err(AppError::ValidationError(format!(
                "post is {len} characters, the limit is {limit}"
            )));
        }
        let id = self.repo.insert(text).await?;
        info!(id, "queued hand-written post");
        Ok(id)
    }

    pub async fn store_batch(&self, posts: &[String]) -> Result<usize> {
        let stored = self.repo.insert_many(posts).await?;
        info!(count = stored, "queued post batch");
        Ok(stored)
    }

    fn roll_image(&self) -> bool {
        let p = self.options.image_probability.clamp(0.0, 1.0);
        rand::rng().random_bool(p)
    }

    async fn fetch_image(&self, text: &str) -> Result<Vec<u8>> {
        let url = self.generator.generate_image(text).await?;
        debug!(%url, "image generated");
        self.generator.download_image(&url).await
    }

    /// Publishes the oldest authorized item, optionally with a generated image.
    pub async fn publish_next(&self) -> Result<PublishOutcome> {
        let Some(item) = self.repo.next_authorized().await? else {
            info!("no authorized posts to publish");
            return Ok(PublishOutcome::Idle);
        };
        item.status.apply(Transition::PublishSucceeded)?;

        let mut with_image = false;
        let result = if self.roll_image() {
            match self.fetch_image(&item.content).await {
                Ok(image) => {
                    with_image = true;
                    self.publisher.publish_with_image(&item.content, image).await
                }
                Err(e) => {
                    warn!(id = item.id, error = %e, "image unavailable, posting text only");
                    self.publisher.publish(&item.content).await
                }
            }
        } else {
            self.publisher.publish(&item.content).await
        };

        self.settle(item, result.map(|p| p.remote_id), with_image).await
    }

    async fn settle(
        &self,
        item: ContentItem,
        result: Result<String>,
        with_image: bool,
    ) -> Result<PublishOutcome> {
        match result {
            Ok(remote_id) => {
                match self.repo.mark_posted(item.id).await {
                    Ok(true) => {}
                    Ok(false) => warn!(id = item.id, "published item was no longer authorized"),
                    Err(e) => {
                        error!(
                            id = item.id,
                            %remote_id,
                            error = %e,
                            "post is live but its posted state was not recorded; it may be published again"
                        );
                        return Err(e);
                    }
                }
                info!(id = item.id, %remote_id, with_image, "post published");
                Ok(PublishOutcome::Posted {
                    id: item.id,
                    remote_id,
                    with_image,
                })
            }
            Err(e) => {
                error!(id = item.id, error = %e, "publish failed, will retry next cycle");
                item.status.apply(Transition::PublishFailed)?;
                Ok(PublishOutcome::Failed {
                    id: item.id,
                    reason: e.to_string(),
                })
            }
        }
    }

    pub async fn maintain(&self) -> MaintenanceReport {
        run_maintenance(self.repo.as_ref(), &self.options.maintenance).await
    }

    /// Generate, publish, maintain. No step's failure stops the others.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let generated = match self.generate_and_store().await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(error = %e, "generation step failed");
                None
            }
        };

        let publish = match self.publish_next().await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(error = %e, "publish step failed");
                None
            }
        };

        let maintenance = self.maintain().await;
        CycleReport {
            generated,
            publish,
            maintenance,
        }
    }
}
