//! # cb-x
//!
//! X (Twitter) implementation of `Publisher`.
//! Text posts go through the v2 posts endpoint; images are uploaded through
//! the v1.1 media endpoint first and attached by media id.

use std::time::Duration;

use async_trait::async_trait;
use cb_auth_oauth1::OAuth1Signer;
use cb_core::error::{AppError, Result};
use cb_core::models::Published;
use cb_core::traits::Publisher;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const DEFAULT_API_BASE: &str = "https://api.twitter.com";
pub const DEFAULT_UPLOAD_BASE: &str = "https://upload.twitter.com";

const POSTS_PATH: &str = "/2/tweets";
const MEDIA_UPLOAD_PATH: &str = "/1.1/media/upload.json";

#[derive(Debug, Clone)]
pub struct XOptions {
    pub api_base: String,
    pub upload_base: String,
    pub timeout: Duration,
}

impl Default for XOptions {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            upload_base: DEFAULT_UPLOAD_BASE.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreatePost<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<PostMedia>,
}

#[derive(Debug, Serialize)]
struct PostMedia {
    media_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CreatePostResponse {
    data: CreatedPost,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    media_id_string: String,
}

/// Transport-level failure: no HTTP status was received.
fn transport(err: reqwest::Error) -> AppError {
    AppError::PublishError {
        code: 0,
        message: err.to_string(),
    }
}

async fn rejected(response: reqwest::Response) -> AppError {
    let code = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    warn!(code, %message, "X API rejected the request");
    AppError::PublishError { code, message }
}

pub struct XPublisher {
    client: Client,
    signer: OAuth1Signer,
    options: XOptions,
}

impl XPublisher {
    pub fn new(signer: OAuth1Signer, options: XOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            signer,
            options,
        })
    }

    fn url(base: &str, path: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), path)
    }

    async fn upload_media(&self, image: Vec<u8>) -> Result<String> {
        let url = Self::url(&self.options.upload_base, MEDIA_UPLOAD_PATH);
        let form = Form::new().part("media", Part::bytes(image).file_name("image.png"));

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.signer.authorization_header("POST", &url, &[]))
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;

        if response.status() != StatusCode::OK {
            return Err(rejected(response).await);
        }
        let body: MediaUploadResponse = response.json().await.map_err(transport)?;
        debug!(media_id = %body.media_id_string, "image uploaded");
        Ok(body.media_id_string)
    }

    async fn create_post(&self, text: &str, media: Option<PostMedia>) -> Result<Published> {
        let url = Self::url(&self.options.api_base, POSTS_PATH);
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.signer.authorization_header("POST", &url, &[]))
            .json(&CreatePost { text, media })
            .send()
            .await
            .map_err(transport)?;

        if response.status() != StatusCode::CREATED {
            return Err(rejected(response).await);
        }
        let body: CreatePostResponse = response.json().await.map_err(transport)?;
        info!(remote_id = %body.data.id, "post created");
        Ok(Published {
            remote_id: body.data.id,
        })
    }
}

#[async_trait]
impl Publisher for XPublisher {
    async fn publish(&self, text: &str) -> Result<Published> {
        self.create_post(text, None).await
    }

    async fn publish_with_image(&self, text: &str, image: Vec<u8>) -> Result<Published> {
        let media_id = self.upload_media(image).await?;
        self.create_post(
            text,
            Some(PostMedia {
                media_ids: vec![media_id],
            }),
        )
        .await
    }
}
