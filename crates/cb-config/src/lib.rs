//! # cb-config
//!
//! Layered settings for Cerberus: built-in defaults, an optional TOML file,
//! then `CERBERUS__SECTION__KEY` environment variables. The conventional
//! provider variables (`OPENAI_API_KEY`, `X_API_KEY`, ...) are honoured last.

use std::path::Path;

use config::{Config, ConfigBuilder, Environment, File};
use config::builder::DefaultState;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "cerberus.toml";
const ENV_PREFIX: &str = "CERBERUS";
/// Upper bound for `database.retention_days` (about a century).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Provider credentials accepted under their conventional names.
const LEGACY_ENV: [(&str, &str); 5] = [
    ("openai.api_key", "OPENAI_API_KEY"),
    ("x.api_key", "X_API_KEY"),
    ("x.api_secret", "X_API_SECRET"),
    ("x.access_token", "X_ACCESS_TOKEN"),
    ("x.access_token_secret", "X_ACCESS_TOKEN_SECRET"),
];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Missing credential `{0}`")]
    MissingCredential(&'static str),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_format: LogFormat,
    pub database: DatabaseSettings,
    pub schedule: ScheduleSettings,
    pub content: ContentSettings,
    pub http: HttpSettings,
    pub openai: OpenAiSettings,
    pub x: XSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    /// Upper bound on stored rows; posted rows are evicted past it.
    pub max_items: u64,
    /// Posted rows older than this many days are deleted.
    pub retention_days: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite:cerberus.db".to_string(),
            max_items: 10_000,
            retention_days: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub sleep_min_secs: u64,
    pub sleep_max_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            sleep_min_secs: 2 * 60 * 60,
            sleep_max_secs: 4 * 60 * 60,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ContentSettings {
    pub max_post_length: usize,
    pub hashtag_count: usize,
    pub fallback_hashtags: Vec<String>,
    pub image_probability: f64,
    pub bulk_count: usize,
    /// System prompt; `{theme}` and `{recent_topics}` are substituted.
    pub persona: String,
    pub themes: Vec<String>,
    pub recent_topics_path: String,
    pub recent_topics_capacity: usize,
}

pub const DEFAULT_PERSONA: &str = "You are Cerberus, a cypherpunk technologist who writes short, \
sharp posts about decentralisation, security, gaming and emerging technology.\n\
Write about: {theme}.\n\
Keep it between 250 and 300 characters, open with a hook rather than a stock phrase, \
make one bold but reasoned claim, and finish with a line that invites discussion. \
Include one or two specific hashtags. Use Australian English.\n\
Topics covered recently, pick a different angle: {recent_topics}.";

fn default_themes() -> Vec<String> {
    [
        "Decentralisation and the power structures it threatens",
        "Blockchain infrastructure beyond speculation",
        "Privacy and cybersecurity as individual rights",
        "Game engines and immersive worlds",
        "Open-source software as a lever for change",
        "Machine learning and its ethical trade-offs",
        "Cypherpunk ideas in modern technology",
        "Edge computing and the devices around us",
        "Technology for sustainability",
        "Communities built around games and code",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            max_post_length: 280,
            hashtag_count: 3,
            fallback_hashtags: vec!["#tech".into(), "#innovation".into(), "#future".into()],
            image_probability: 0.1,
            bulk_count: 10,
            persona: DEFAULT_PERSONA.to_string(),
            themes: default_themes(),
            recent_topics_path: "recent_topics.json".to_string(),
            recent_topics_capacity: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com".to_string(),
            text_model: "gpt-4o-mini".to_string(),
            image_model: "dall-e-3".to_string(),
            max_tokens: 100,
            temperature: 0.8,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct XSettings {
    pub api_key: Option<SecretString>,
    pub api_secret: Option<SecretString>,
    pub access_token: Option<SecretString>,
    pub access_token_secret: Option<SecretString>,
    pub api_base: String,
    pub upload_base: String,
}

impl Default for XSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            access_token: None,
            access_token_secret: None,
            api_base: "https://api.twitter.com".to_string(),
            upload_base: "https://upload.twitter.com".to_string(),
        }
    }
}

/// Four X credentials, all present.
pub struct XCredentials<'a> {
    pub api_key: &'a SecretString,
    pub api_secret: &'a SecretString,
    pub access_token: &'a SecretString,
    pub access_token_secret: &'a SecretString,
}

fn required<'a>(
    value: &'a Option<SecretString>,
    name: &'static str,
) -> Result<&'a SecretString, SettingsError> {
    match value {
        Some(secret) if !secret.expose_secret().trim().is_empty() => Ok(secret),
        _ => Err(SettingsError::MissingCredential(name)),
    }
}

impl OpenAiSettings {
    pub fn api_key(&self) -> Result<&SecretString, SettingsError> {
        required(&self.api_key, "openai.api_key")
    }
}

impl XSettings {
    pub fn credentials(&self) -> Result<XCredentials<'_>, SettingsError> {
        Ok(XCredentials {
            api_key: required(&self.api_key, "x.api_key")?,
            api_secret: required(&self.api_secret, "x.api_secret")?,
            access_token: required(&self.access_token, "x.access_token")?,
            access_token_secret: required(&self.access_token_secret, "x.access_token_secret")?,
        })
    }
}

impl Settings {
    /// Loads `.env`, then `path` (or `cerberus.toml` when present), then the
    /// environment, and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("content.themes")
                .with_list_parse_key("content.fallback_hashtags")
                .try_parsing(true),
        );

        let legacy = LEGACY_ENV
            .iter()
            .map(|(key, var)| (*key, std::env::var(var).ok().filter(|v| !v.is_empty())));
        Self::from_builder(with_overrides(builder, legacy)?)
    }

    /// Deserializes and validates whatever `builder` has been given.
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, SettingsError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        debug!(database = %settings.database.url, "configuration loaded");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |key: &'static str, reason: &str| {
            Err(SettingsError::Invalid {
                key,
                reason: reason.to_string(),
            })
        };

        if self.schedule.sleep_min_secs > self.schedule.sleep_max_secs {
            return invalid("schedule.sleep_min_secs", "must not exceed sleep_max_secs");
        }
        if !(0.0..=1.0).contains(&self.content.image_probability) {
            return invalid("content.image_probability", "must be between 0 and 1");
        }
        if self.content.max_post_length == 0 {
            return invalid("content.max_post_length", "must be positive");
        }
        if self.content.recent_topics_capacity == 0 {
            return invalid("content.recent_topics_capacity", "must be positive");
        }
        if self.content.themes.is_empty() {
            return invalid("content.themes", "at least one theme is required");
        }
        if self.database.retention_days > MAX_RETENTION_DAYS {
            return invalid("database.retention_days", "must not exceed 36500");
        }
        if self.database.max_items == 0 {
            return invalid("database.max_items", "must be positive");
        }
        if self.http.timeout_secs == 0 {
            return invalid("http.timeout_secs", "must be positive");
        }
        Ok(())
    }
}

fn with_overrides<'a>(
    mut builder: ConfigBuilder<DefaultState>,
    overrides: impl Iterator<Item = (&'a str, Option<String>)>,
) -> Result<ConfigBuilder<DefaultState>, SettingsError> {
    for (key, value) in overrides {
        builder = builder.set_override_option(key, value)?;
    }
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<Settings, SettingsError> {
        Settings::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn test_defaults_without_sources() {
        let settings = from_toml("").unwrap();
        assert_eq!(settings.log_format, LogFormat::Pretty);
        assert_eq!(settings.database.max_items, 10_000);
        assert_eq!(settings.database.retention_days, 30);
        assert_eq!(settings.content.max_post_length, 280);
        assert_eq!(settings.content.recent_topics_capacity, 10);
        assert_eq!(settings.content.image_probability, 0.1);
        assert_eq!(settings.openai.text_model, "gpt-4o-mini");
        assert!(settings.openai.api_key.is_none());
    }

    #[test]
    fn test_file_overrides_defaults_per_key() {
        let settings = from_toml(
            r#"
            log_format = "json"

            [database]
            retention_days = 7

            [content]
            themes = ["Only one"]
            "#,
        )
        .unwrap();
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.database.retention_days, 7);
        assert_eq!(settings.database.max_items, 10_000);
        assert_eq!(settings.content.themes, vec!["Only one".to_string()]);
        assert_eq!(settings.content.hashtag_count, 3);
    }

    #[test]
    fn test_inverted_sleep_bounds_rejected() {
        let err = from_toml(
            r#"
            [schedule]
            sleep_min_secs = 100
            sleep_max_secs = 10
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { key: "schedule.sleep_min_secs", .. }));
    }

    #[test]
    fn test_probability_out_of_range_rejected() {
        let err = from_toml("[content]\nimage_probability = 1.5").unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { key: "content.image_probability", .. }));
    }

    #[test]
    fn test_retention_beyond_a_century_rejected() {
        let err = from_toml("[database]\nretention_days = 4294967295").unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { key: "database.retention_days", .. }));

        let settings = from_toml("[database]\nretention_days = 36500").unwrap();
        assert_eq!(settings.database.retention_days, MAX_RETENTION_DAYS);
    }

    #[test]
    fn test_legacy_credentials_override_file() {
        let builder = Config::builder().add_source(File::from_str(
            "[openai]\napi_key = \"from-file\"",
            FileFormat::Toml,
        ));
        let overrides = vec![
            ("openai.api_key", Some("from-env".to_string())),
            ("x.api_key", None),
        ];
        let builder = with_overrides(builder, overrides.into_iter()).unwrap();
        let settings = Settings::from_builder(builder).unwrap();

        assert_eq!(settings.openai.api_key().unwrap().expose_secret(), "from-env");
        assert!(settings.x.api_key.is_none());
    }

    #[test]
    fn test_missing_x_credential_named() {
        let settings = from_toml(
            r#"
            [x]
            api_key = "k"
            api_secret = "s"
            access_token = "t"
            access_token_secret = "  "
            "#,
        )
        .unwrap();
        match settings.x.credentials() {
            Err(SettingsError::MissingCredential(name)) => assert_eq!(name, "x.access_token_secret"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("blank secret accepted"),
        }
    }
}
