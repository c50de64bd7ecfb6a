//! # cb-openai
//!
//! OpenAI implementation of `ContentGenerator`: chat completions for post text
//! and hashtags, image generation for the occasional illustrated post.

use std::time::Duration;

use async_trait::async_trait;
use cb_core::error::{AppError, Result};
use cb_core::fitter::normalize_hashtag;
use cb_core::models::GenerationPrompt;
use cb_core::traits::ContentGenerator;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// OpenAI API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

const HASHTAG_SYSTEM_PROMPT: &str = "Generate relevant hashtags for the given post content.";
const IMAGE_PROMPT_PREFIX: &str = "Create an image representing the following tech concept: ";

/// Model and sampling parameters.
#[derive(Debug, Clone)]
pub struct OpenAiOptions {
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub hashtag_max_tokens: u32,
    pub hashtag_temperature: f32,
    pub image_size: String,
    pub image_quality: String,
    pub timeout: Duration,
}

impl Default for OpenAiOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            text_model: "gpt-4o-mini".to_string(),
            image_model: "dall-e-3".to_string(),
            max_tokens: 100,
            temperature: 0.8,
            hashtag_max_tokens: 30,
            hashtag_temperature: 0.7,
            image_size: "1024x1024".to_string(),
            image_quality: "standard".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    n: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: String,
    size: &'a str,
    quality: &'a str,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

fn generation(err: impl std::fmt::Display) -> AppError {
    AppError::GenerationError(err.to_string())
}

pub struct OpenAiGenerator {
    client: Client,
    api_key: SecretString,
    options: OpenAiOptions,
}

impl OpenAiGenerator {
    pub fn new(api_key: SecretString, options: OpenAiOptions) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(AppError::ConfigError("OpenAI API key is empty".into()));
        }
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            options,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.options.base_url.trim_end_matches('/'), path)
    }

    async fn chat(&self, system: &str, user: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        let request = ChatRequest {
            model: &self.options.text_model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            max_tokens,
            n: 1,
            temperature,
        };

        let response = self
            .client
            .post(self.endpoint("/v1/chat/completions"))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(generation)?;

        let body: ChatResponse = parse_success(response).await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AppError::GenerationError("completion returned no content".into()))
    }
}

/// Decodes a 2xx body, or turns the API's error envelope into a
/// `GenerationError`.
async fn parse_success<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let raw = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorResponse>(&raw)
            .map(|envelope| envelope.error.message)
            .unwrap_or(raw);
        warn!(%status, %message, "OpenAI request failed");
        return Err(AppError::GenerationError(format!("{status}: {message}")));
    }
    response.json::<T>().await.map_err(generation)
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn generate_text(&self, prompt: &GenerationPrompt) -> Result<String> {
        debug!(model = %self.options.text_model, "requesting post text");
        self.chat(
            &prompt.system,
            &prompt.user,
            self.options.max_tokens,
            self.options.temperature,
        )
        .await
    }

    async fn generate_hashtags(&self, text: &str, count: usize) -> Result<Vec<String>> {
        let user = format!("Generate {count} relevant hashtags for this post:\n\n{text}");
        let reply = self
            .chat(
                HASHTAG_SYSTEM_PROMPT,
                &user,
                self.options.hashtag_max_tokens,
                self.options.hashtag_temperature,
            )
            .await?;

        let tags: Vec<String> = reply
            .split_whitespace()
            .filter_map(normalize_hashtag)
            .take(count)
            .collect();
        if tags.is_empty() {
            return Err(AppError::GenerationError(format!(
                "no hashtags in reply '{reply}'"
            )));
        }
        Ok(tags)
    }

    async fn generate_image(&self, description: &str) -> Result<String> {
        if description.trim().is_empty() {
            return Err(AppError::ValidationError(
                "image description must not be empty".into(),
            ));
        }

        let request = ImageRequest {
            model: &self.options.image_model,
            prompt: format!("{IMAGE_PROMPT_PREFIX}{description}"),
            size: &self.options.image_size,
            quality: &self.options.image_quality,
            n: 1,
        };

        let response = self
            .client
            .post(self.endpoint("/v1/images/generations"))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(generation)?;

        let body: ImageResponse = parse_success(response).await?;
        body.data
            .into_iter()
            .next()
            .and_then(|image| image.url)
            .ok_or_else(|| AppError::GenerationError("image response carried no URL".into()))
    }

    async fn download_image(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await.map_err(generation)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::GenerationError(format!(
                "downloading image failed with {status}"
            )));
        }
        let bytes = response.bytes().await.map_err(generation)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(server: &MockServer) -> OpenAiGenerator {
        let options = OpenAiOptions {
            base_url: server.uri(),
            ..OpenAiOptions::default()
        };
        OpenAiGenerator::new(SecretString::from("test-key".to_string()), options).unwrap()
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
    }

    #[tokio::test]
    async fn test_generate_text_sends_prompt_and_trims_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "max_tokens": 100,
                "messages": [
                    { "role": "system", "content": "be brief" },
                    { "role": "user", "content": "write" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("  Own your keys. #crypto \n")))
            .expect(1)
            .mount(&server)
            .await;

        let prompt = GenerationPrompt {
            system: "be brief".into(),
            user: "write".into(),
        };
        let text = generator(&server).generate_text(&prompt).await.unwrap();
        assert_eq!(text, "Own your keys. #crypto");
    }

    #[tokio::test]
    async fn test_api_error_becomes_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "Rate limit reached", "type": "requests" }
            })))
            .mount(&server)
            .await;

        let prompt = GenerationPrompt {
            system: String::new(),
            user: "write".into(),
        };
        let err = generator(&server).generate_text(&prompt).await.unwrap_err();
        match err {
            AppError::GenerationError(message) => assert!(message.contains("Rate limit reached")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_completion_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let prompt = GenerationPrompt {
            system: String::new(),
            user: "write".into(),
        };
        assert!(matches!(
            generator(&server).generate_text(&prompt).await,
            Err(AppError::GenerationError(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_hashtags_normalizes_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({ "max_tokens": 30 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("ai #ML, Rust extra")))
            .mount(&server)
            .await;

        let tags = generator(&server)
            .generate_hashtags("Systems languages are back.", 3)
            .await
            .unwrap();
        assert_eq!(tags, vec!["#ai", "#ML", "#Rust"]);
    }

    #[tokio::test]
    async fn test_generate_image_returns_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .and(body_partial_json(json!({
                "model": "dall-e-3",
                "prompt": "Create an image representing the following tech concept: mesh radios",
                "size": "1024x1024"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "url": "https://images.example/abc.png" }]
            })))
            .mount(&server)
            .await;

        let url = generator(&server).generate_image("mesh radios").await.unwrap();
        assert_eq!(url, "https://images.example/abc.png");
    }

    #[tokio::test]
    async fn test_generate_image_rejects_blank_description() {
        let server = MockServer::start().await;
        let err = generator(&server).generate_image("  ").await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_download_image_returns_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, b'P', b'N', b'G']))
            .mount(&server)
            .await;

        let bytes = generator(&server)
            .download_image(&format!("{}/img.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_blank_api_key_is_rejected() {
        let result = OpenAiGenerator::new(SecretString::from(String::new()), OpenAiOptions::default());
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }
}
