//! Assembles the engine from settings.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use cb_auth_oauth1::OAuth1Signer;
use cb_config::Settings;
use cb_core::error::{AppError, Result};
use cb_core::models::Published;
use cb_core::traits::{ContentGenerator, ContentRepo, Publisher};
use cb_core::RecentTopics;
use cb_db_sqlite::SqliteContentRepo;
use cb_engine::{Engine, EngineOptions, MaintenancePolicy, SleepWindow};
use cb_openai::{OpenAiGenerator, OpenAiOptions};
use cb_x::{XOptions, XPublisher};
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

/// Stands in when X credentials are absent; every call fails.
struct UnconfiguredPublisher;

#[async_trait]
impl Publisher for UnconfiguredPublisher {
    async fn publish(&self, _text: &str) -> Result<Published> {
        Err(AppError::ConfigError("X credentials are not configured".into()))
    }

    async fn publish_with_image(&self, text: &str, _image: Vec<u8>) -> Result<Published> {
        self.publish(text).await
    }
}

pub fn maintenance_policy(settings: &Settings) -> MaintenancePolicy {
    MaintenancePolicy {
        retention_days: settings.database.retention_days,
        max_items: settings.database.max_items,
    }
}

pub async fn open_repo(settings: &Settings) -> anyhow::Result<Arc<dyn ContentRepo>> {
    let repo = SqliteContentRepo::new(&settings.database.url, settings.database.max_items)
        .await
        .with_context(|| format!("opening database {}", settings.database.url))?;
    Ok(Arc::new(repo))
}

fn http_timeout(settings: &Settings) -> Duration {
    Duration::from_secs(settings.http.timeout_secs)
}

fn build_generator(settings: &Settings) -> anyhow::Result<Arc<dyn ContentGenerator>> {
    let key = settings.openai.api_key()?;
    let options = OpenAiOptions {
        base_url: settings.openai.base_url.clone(),
        text_model: settings.openai.text_model.clone(),
        image_model: settings.openai.image_model.clone(),
        max_tokens: settings.openai.max_tokens,
        temperature: settings.openai.temperature,
        timeout: http_timeout(settings),
        ..OpenAiOptions::default()
    };
    let generator = OpenAiGenerator::new(SecretString::from(key.expose_secret().to_string()), options)?;
    Ok(Arc::new(generator))
}

/// With `required` unset, missing credentials yield a publisher that refuses
/// every post instead of an error.
fn build_publisher(settings: &Settings, required: bool) -> anyhow::Result<Arc<dyn Publisher>> {
    let creds = match settings.x.credentials() {
        Ok(creds) => creds,
        Err(e) if !required => {
            warn!(error = %e, "publishing disabled");
            return Ok(Arc::new(UnconfiguredPublisher));
        }
        Err(e) => return Err(e.into()),
    };

    let signer = OAuth1Signer::new(
        creds.api_key.expose_secret(),
        SecretString::from(creds.api_secret.expose_secret().to_string()),
        creds.access_token.expose_secret(),
        SecretString::from(creds.access_token_secret.expose_secret().to_string()),
    );
    let options = XOptions {
        api_base: settings.x.api_base.clone(),
        upload_base: settings.x.upload_base.clone(),
        timeout: http_timeout(settings),
    };
    Ok(Arc::new(XPublisher::new(signer, options)?))
}

fn engine_options(settings: &Settings) -> EngineOptions {
    let content = &settings.content;
    EngineOptions {
        persona: content.persona.clone(),
        themes: content.themes.clone(),
        max_post_length: content.max_post_length,
        hashtag_count: content.hashtag_count,
        fallback_hashtags: content.fallback_hashtags.clone(),
        image_probability: content.image_probability,
        topics_path: Some(PathBuf::from(&content.recent_topics_path)),
        maintenance: maintenance_policy(settings),
        sleep: SleepWindow::from_secs(settings.schedule.sleep_min_secs, settings.schedule.sleep_max_secs),
    }
}

pub async fn build_engine(settings: &Settings, require_publisher: bool) -> anyhow::Result<Engine> {
    let options = engine_options(settings);
    let topics_path = PathBuf::from(&settings.content.recent_topics_path);
    let topics = RecentTopics::load(&topics_path, settings.content.recent_topics_capacity)
        .with_context(|| format!("loading {}", topics_path.display()))?;

    Ok(Engine::new(
        open_repo(settings).await?,
        build_generator(settings)?,
        build_publisher(settings, require_publisher)?,
        topics,
        options,
    ))
}
