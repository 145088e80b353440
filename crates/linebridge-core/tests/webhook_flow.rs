//! LINE webhook to push reply, driven through the router against stub vendors.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use linebridge_core::channel::line::{LineChannel, SIGNATURE_HEADER};
use linebridge_core::config::Config;
use linebridge_core::intent::APOLOGY;
use linebridge_core::service::http::{create_router, AppState};

use common::{VendorStub, BLOCKED_PROMPT, JOKE_REPLY_SANITIZED, LINE_SECRET};

fn app(config: Config) -> (Arc<AppState>, Router) {
    let state = Arc::new(AppState::from_config(config));
    (state.clone(), create_router(state))
}

fn text_events(user_id: &str, text: &str) -> String {
    json!({
        "destination": "Ubot",
        "events": [{
            "type": "message",
            "replyToken": "reply-token",
            "source": {"type": "user", "userId": user_id},
            "message": {"type": "text", "id": "m1", "text": text},
            "timestamp": 1_700_000_000_000u64
        }]
    })
    .to_string()
}

fn webhook_request(body: &str, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn signed(body: &str) -> Request<Body> {
    webhook_request(body, &LineChannel::sign(LINE_SECRET, body.as_bytes()))
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(resp).await).unwrap()
}

#[tokio::test]
async fn test_knowledge_answer_is_pushed_without_fallback() {
    let stub = VendorStub::default();
    let base = stub.spawn().await;
    let (state, app) = app(common::stub_config(&base));

    let resp = app
        .oneshot(signed(&text_events("U1", "How are you?")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "OK");

    state.scheduler.flush().await;

    let detect = stub.requests_to(":detectIntent");
    assert_eq!(detect.len(), 1);
    assert_eq!(
        detect[0].path,
        "/v2beta1/projects/demo/agent/sessions/U1:detectIntent"
    );
    assert_eq!(detect[0].authorization.as_deref(), Some("Bearer google-token"));
    assert_eq!(detect[0].json()["queryInput"]["text"]["languageCode"], "en-US");

    let pushes = stub.requests_to("/v2/bot/message/push");
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].authorization.as_deref(), Some("Bearer line-token"));
    assert_eq!(
        pushes[0].json(),
        json!({"to": "U1", "messages": [{"type": "text", "text": "I'm great, thanks for asking!"}]})
    );

    assert!(stub.requests_to(":generateContent").is_empty());
}

#[tokio::test]
async fn test_fallback_intent_uses_generative_reply() {
    let stub = VendorStub::default();
    let base = stub.spawn().await;
    let (state, app) = app(common::stub_config(&base));

    let resp = app
        .oneshot(signed(&text_events("U2", "Tell me a joke")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    state.scheduler.flush().await;

    let generate = stub.requests_to(":generateContent");
    assert_eq!(generate.len(), 1);
    assert_eq!(generate[0].path, "/v1beta/models/gemini-2.0-flash:generateContent");
    let prompt = generate[0].json()["contents"][0]["parts"][0]["text"].clone();
    assert_eq!(
        prompt,
        json!("Tell me a joke\n\nPlease respond in 10 words or less.")
    );

    let pushes = stub.requests_to("/v2/bot/message/push");
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].json()["messages"][0]["text"], JOKE_REPLY_SANITIZED);
}

#[tokio::test]
async fn test_unreachable_intent_service_falls_back() {
    let stub = VendorStub::default();
    let base = stub.spawn().await;
    let mut config = common::stub_config(&base);
    config.dialogflow.api_base = common::dead_base_url();
    let (state, _app) = app(config);

    let intent = state.intent.resolve_intent("Where is my order?", "U3").await;
    assert_eq!(intent.reply_text, APOLOGY);
    assert!(intent.is_fallback);

    let reply = state.resolver.resolve("Where is my order?", "U3").await;
    assert_eq!(reply, JOKE_REPLY_SANITIZED);
    assert_eq!(stub.requests_to(":generateContent").len(), 1);
}

#[tokio::test]
async fn test_bad_signature_is_rejected() {
    let stub = VendorStub::default();
    let base = stub.spawn().await;
    let (state, app) = app(common::stub_config(&base));

    let body = text_events("U1", "How are you?");
    let signature = LineChannel::sign(LINE_SECRET, body.as_bytes());
    let tampered = body.replacen("How", "Who", 1);

    let resp = app
        .clone()
        .oneshot(webhook_request(&tampered, &signature))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(resp).await, "Unauthorized");

    let resp = app.oneshot(webhook_request(&body, "")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    state.scheduler.flush().await;
    assert!(stub.requests().is_empty());
    assert_eq!(state.scheduler.stats().batches, 0);
}

#[tokio::test]
async fn test_malformed_body_with_valid_signature() {
    let stub = VendorStub::default();
    let base = stub.spawn().await;
    let (_state, app) = app(common::stub_config(&base));

    let resp = app.oneshot(signed("{not json")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(resp).await, json!({"error": "Something went wrong"}));
}

#[tokio::test]
async fn test_batch_skips_non_text_events_and_counts() {
    let stub = VendorStub::default();
    let base = stub.spawn().await;
    let (state, app) = app(common::stub_config(&base));

    let body = json!({
        "destination": "Ubot",
        "events": [
            {"type": "follow", "source": {"type": "user", "userId": "U1"}},
            {"type": "message", "source": {"type": "user", "userId": "U1"},
             "message": {"type": "sticker", "id": "s1"}},
            {"type": "message", "source": {"type": "user", "userId": "U1"},
             "message": {"type": "text", "id": "m1", "text": "How are you?"}},
            {"type": "message", "source": {"type": "user", "userId": "U1"},
             "message": {"type": "text", "id": "m2", "text": "What can you do?"}}
        ]
    })
    .to_string();

    let resp = app.clone().oneshot(signed(&body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    state.scheduler.flush().await;

    let texts: Vec<Value> = stub
        .requests_to("/v2/bot/message/push")
        .iter()
        .map(|r| r.json()["messages"][0]["text"].clone())
        .collect();
    assert_eq!(
        texts,
        vec![
            json!("I'm great, thanks for asking!"),
            json!("I can answer questions about our store.")
        ]
    );

    let health = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let health = body_json(health).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(
        health["webhook"],
        json!({"batches": 1, "eventsProcessed": 2, "eventsSkipped": 2, "failures": 0})
    );
}

#[tokio::test]
async fn test_empty_batch_is_acknowledged() {
    let stub = VendorStub::default();
    let base = stub.spawn().await;
    let (state, app) = app(common::stub_config(&base));

    let resp = app
        .oneshot(signed(r#"{"destination":"Ubot","events":[]}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    state.scheduler.flush().await;
    assert_eq!(state.scheduler.stats().batches, 0);
    assert!(stub.requests().is_empty());
}

#[tokio::test]
async fn test_push_failure_is_counted() {
    let stub = VendorStub::default();
    let base = stub.spawn().await;
    let mut config = common::stub_config(&base);
    config.line.api_base = common::dead_base_url();
    let (state, app) = app(config);

    let resp = app
        .oneshot(signed(&text_events("U1", "How are you?")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    state.scheduler.flush().await;

    let stats = state.scheduler.stats();
    assert_eq!(stats.events_processed, 1);
    assert_eq!(stats.failures, 1);
}

#[tokio::test]
async fn test_smoke_endpoints() {
    let stub = VendorStub::default();
    let base = stub.spawn().await;
    let (_state, app) = app(common::stub_config(&base));

    let resp = app
        .clone()
        .oneshot(
            Request::get("/test/dialogflow-test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        body_json(resp).await,
        json!({"reply": {"replyText": "I can answer questions about our store.", "isFallback": false}})
    );
    assert_eq!(
        stub.requests_to(":detectIntent")[0].path,
        "/v2beta1/projects/demo/agent/sessions/test-user:detectIntent"
    );

    let resp = app
        .oneshot(Request::get("/test/gemini-test").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"reply": JOKE_REPLY_SANITIZED}));
}

#[tokio::test]
async fn test_blocked_generative_reply_uses_failure_sentence() {
    let stub = VendorStub::default();
    let base = stub.spawn().await;
    let (state, _app) = app(common::stub_config(&base));

    let reply = state.fallback.generate_fallback(BLOCKED_PROMPT).await;
    assert_eq!(reply, "Failed to get response from Gemini AI.");
    assert_eq!(stub.requests_to(":generateContent").len(), 1);
}
