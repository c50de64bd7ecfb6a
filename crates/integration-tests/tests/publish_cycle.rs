mod common;

use cb_core::models::ContentStatus;
use cb_core::traits::ContentRepo;
use cb_engine::PublishOutcome;
use common::{authorized, created_post, harness, GENERATED};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_generated_post_is_reviewed_then_published() {
    let mut h = harness(0.0).await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .and(body_partial_json(json!({ "text": GENERATED })))
        .respond_with(created_post("1001"))
        .expect(1)
        .mount(&h.x)
        .await;

    let report = h.engine.run_cycle().await;
    let id = report.generated.expect("a post was generated");
    assert_eq!(report.publish, Some(PublishOutcome::Idle));
    assert!(report.maintenance.is_clean());

    let pending = h.repo.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].content, GENERATED);
    assert!(h.engine.topics().contains("privacy"));

    assert!(h.repo.authorize(id).await.unwrap());
    let outcome = h.engine.publish_next().await.unwrap();
    assert_eq!(
        outcome,
        PublishOutcome::Posted {
            id,
            remote_id: "1001".into(),
            with_image: false,
        }
    );

    let item = h.repo.get(id).await.unwrap().unwrap();
    assert_eq!(item.status, ContentStatus::Posted);
    assert!(item.posted_at.is_some());
    assert!(h.repo.next_authorized().await.unwrap().is_none());
}

#[tokio::test]
async fn test_rejected_post_is_retried_next_cycle() {
    let h = harness(0.0).await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(ResponseTemplate::new(503).set_body_string("over capacity"))
        .up_to_n_times(1)
        .mount(&h.x)
        .await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(created_post("2002"))
        .mount(&h.x)
        .await;

    let id = authorized(&h.repo, "Second time lucky #retry").await;

    match h.engine.publish_next().await.unwrap() {
        PublishOutcome::Failed { id: failed, reason } => {
            assert_eq!(failed, id);
            assert!(reason.contains("503"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    let item = h.repo.get(id).await.unwrap().unwrap();
    assert_eq!(item.status, ContentStatus::Authorized);
    assert!(item.posted_at.is_none());

    assert!(matches!(
        h.engine.publish_next().await.unwrap(),
        PublishOutcome::Posted { remote_id, .. } if remote_id == "2002"
    ));
}

#[tokio::test]
async fn test_oldest_authorized_is_published_first() {
    let h = harness(0.0).await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .and(body_partial_json(json!({ "text": "first in line" })))
        .respond_with(created_post("1"))
        .expect(1)
        .mount(&h.x)
        .await;

    let first = authorized(&h.repo, "first in line").await;
    authorized(&h.repo, "second in line").await;

    assert!(matches!(
        h.engine.publish_next().await.unwrap(),
        PublishOutcome::Posted { id, .. } if id == first
    ));
}

#[tokio::test]
async fn test_image_post_uploads_media_first() {
    let h = harness(1.0).await;
    let image_url = format!("{}/files/generated.png", h.openai.uri());
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "url": image_url }]
        })))
        .expect(1)
        .mount(&h.openai)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/generated.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, 0x50, 0x4e, 0x47]))
        .mount(&h.openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/1.1/media/upload.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "media_id": 555, "media_id_string": "555"
        })))
        .expect(1)
        .mount(&h.x)
        .await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .and(body_partial_json(json!({ "media": { "media_ids": ["555"] } })))
        .respond_with(created_post("3003"))
        .expect(1)
        .mount(&h.x)
        .await;

    let id = authorized(&h.repo, "Worth a thousand words #image").await;

    assert_eq!(
        h.engine.publish_next().await.unwrap(),
        PublishOutcome::Posted {
            id,
            remote_id: "3003".into(),
            with_image: true,
        }
    );
}

#[tokio::test]
async fn test_image_failure_still_publishes_text() {
    let h = harness(1.0).await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "Your request was rejected by the safety system." }
        })))
        .mount(&h.openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/1.1/media/upload.json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.x)
        .await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(created_post("4004"))
        .expect(1)
        .mount(&h.x)
        .await;

    let id = authorized(&h.repo, "Words will do #text").await;

    assert_eq!(
        h.engine.publish_next().await.unwrap(),
        PublishOutcome::Posted {
            id,
            remote_id: "4004".into(),
            with_image: false,
        }
    );
    assert_eq!(
        h.repo.get(id).await.unwrap().unwrap().status,
        ContentStatus::Posted
    );
}
