//! Shared harness: in-memory SQLite plus wiremock stand-ins for the
//! generative and social APIs.

#![allow(dead_code)]

use std::sync::Arc;

use cb_auth_oauth1::OAuth1Signer;
use cb_core::traits::ContentRepo;
use cb_core::RecentTopics;
use cb_db_sqlite::SqliteContentRepo;
use cb_engine::{Engine, EngineOptions};
use cb_openai::{OpenAiGenerator, OpenAiOptions};
use cb_x::{XOptions, XPublisher};
use secrecy::SecretString;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const GENERATED: &str = "Privacy is a protocol, not a setting. #privacy";

pub struct Harness {
    pub engine: Engine,
    pub repo: Arc<SqliteContentRepo>,
    pub openai: MockServer,
    pub x: MockServer,
    _dir: TempDir,
}

pub fn completion(content: &str) -> Value {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
}

pub fn created_post(id: &str) -> ResponseTemplate {
    ResponseTemplate::new(201).set_body_json(json!({ "data": { "id": id, "text": "" } }))
}

pub async fn memory_repo() -> SqliteContentRepo {
    SqliteContentRepo::new("sqlite::memory:", 10_000)
        .await
        .expect("in-memory database")
}

pub async fn harness(image_probability: f64) -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let openai = MockServer::start().await;
    let x = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(GENERATED)))
        .mount(&openai)
        .await;

    let repo = Arc::new(memory_repo().await);
    let generator = OpenAiGenerator::new(
        SecretString::from("sk-test".to_string()),
        OpenAiOptions {
            base_url: openai.uri(),
            ..OpenAiOptions::default()
        },
    )
    .expect("generator");
    let signer = OAuth1Signer::new(
        "consumer",
        SecretString::from("consumer-secret".to_string()),
        "token",
        SecretString::from("token-secret".to_string()),
    );
    let publisher = XPublisher::new(
        signer,
        XOptions {
            api_base: x.uri(),
            upload_base: x.uri(),
            ..XOptions::default()
        },
    )
    .expect("publisher");

    let options = EngineOptions {
        image_probability,
        topics_path: Some(dir.path().join("recent_topics.json")),
        ..EngineOptions::default()
    };
    let engine = Engine::new(
        repo.clone() as Arc<dyn ContentRepo>,
        Arc::new(generator),
        Arc::new(publisher),
        RecentTopics::default(),
        options,
    );

    Harness {
        engine,
        repo,
        openai,
        x,
        _dir: dir,
    }
}

/// Queues `content` and authorizes it, returning its id.
pub async fn authorized(repo: &SqliteContentRepo, content: &str) -> i64 {
    let id = repo.insert(content).await.expect("insert");
    assert!(repo.authorize(id).await.expect("authorize"));
    id
}
