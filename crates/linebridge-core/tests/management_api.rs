//! Knowledge-base, document, Q&A and agent routes against a stub Dialogflow.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use linebridge_core::config::Config;
use linebridge_core::service::http::{create_router, AppState};

use common::{VendorStub, KB_PREFIX};

struct TestApp {
    state: Arc<AppState>,
    router: Router,
}

impl TestApp {
    fn new(config: Config) -> Self {
        let state = Arc::new(AppState::from_config(config));
        Self {
            router: create_router(state.clone()),
            state,
        }
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let resp = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

async fn setup() -> (VendorStub, TestApp) {
    let stub = VendorStub::default();
    let base = stub.spawn().await;
    let app = TestApp::new(common::stub_config(&base));
    (stub, app)
}

#[tokio::test]
async fn test_list_categories_filters_and_reshapes() {
    let (stub, app) = setup().await;

    let (status, body) = app
        .call(Method::GET, "/category?filter=BILL&pageSize=5", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["nextPageToken"], "page-2");
    assert_eq!(
        body["data"],
        json!([
            {"name": "Billing FAQ", "id": "kb1", "displayName": "Billing FAQ", "languageCode": "en", "enabled": true},
            {"name": "billing errors", "id": "kb3", "displayName": "billing errors", "languageCode": "en-US", "enabled": true}
        ])
    );
    assert_eq!(
        stub.requests_to("/knowledgeBases")[0].query.as_deref(),
        Some("pageSize=5")
    );
}

#[tokio::test]
async fn test_list_categories_defaults_page_size() {
    let (stub, app) = setup().await;

    let (status, body) = app
        .call(Method::GET, "/category?pageSize=abc&pageToken=", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
    assert_eq!(
        stub.requests_to("/knowledgeBases")[0].query.as_deref(),
        Some("pageSize=10")
    );
}

#[tokio::test]
async fn test_category_lifecycle_and_flags() {
    let (stub, app) = setup().await;

    let (status, body) = app
        .call(Method::POST, "/category", Some(json!({"name": "  "})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"success": false, "message": "Missing name"}));

    let (status, body) = app
        .call(
            Method::POST,
            "/category",
            Some(json!({"name": " Returns ", "enabled": false})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Knowledge Base created");
    assert_eq!(body["data"]["id"], "kb-new");
    assert_eq!(body["data"]["displayName"], "Returns");
    assert_eq!(body["data"]["enabled"], false);
    assert_eq!(
        stub.requests_to("/knowledgeBases")[0].json(),
        json!({"displayName": "Returns"})
    );

    let full_name = format!("{KB_PREFIX}/kb-new");
    assert!(!app.state.kb_flags.is_enabled(&full_name));

    let (status, body) = app
        .call(Method::PATCH, "/category/kb-new/enable", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"id": "kb-new", "enabled": true}));
    assert!(app.state.kb_flags.is_enabled(&full_name));

    let (status, body) = app
        .call(Method::PUT, "/category/kb1", Some(json!({"name": "Billing"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["displayName"], "Billing");
    let patch = stub
        .requests()
        .into_iter()
        .find(|r| r.method == Method::PATCH)
        .unwrap();
    assert_eq!(patch.query.as_deref(), Some("updateMask=displayName"));

    let (status, body) = app.call(Method::GET, "/category/kb1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], "kb1");

    let (status, body) = app.call(Method::GET, "/category/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Not found");

    let (status, body) = app.call(Method::DELETE, "/category/kb-new", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Knowledge Base deleted");
}

#[tokio::test]
async fn test_documents_require_kb_id() {
    let (stub, app) = setup().await;

    let (status, body) = app.call(Method::GET, "/documents", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Knowledge Base ID (kbId) is required");

    let (status, _) = app
        .call(
            Method::POST,
            "/documents",
            Some(json!({"kbId": "kb1", "displayName": "faq.csv", "questions": []})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(stub.requests().is_empty());
}

#[tokio::test]
async fn test_document_routes() {
    let (stub, app) = setup().await;

    let (status, body) = app.call(Method::GET, "/documents?kbId=kb1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!([{"displayName": "faq.csv", "id": "doc-1", "knowledgeTypes": ["FAQ"], "languageCode": "en-US"}])
    );

    let (status, body) = app.call(Method::GET, "/documents/kb1/doc-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!([
            {"question": "What is your name?", "answer": "I am a bot."},
            {"question": "Hours", "answer": "9 to 5"}
        ])
    );

    let (status, body) = app.call(Method::GET, "/documents/kb1/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Document not found");

    let (status, body) = app
        .call(
            Method::PUT,
            "/documents/kb1/doc-1",
            Some(json!({
                "displayName": "faq-v2.csv",
                "questions": [{"question": "Test", "answer": "Test"}]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Document updated");
    assert_eq!(body["data"]["displayName"], "faq-v2.csv");

    let (status, body) = app.call(Method::DELETE, "/documents/kb1/doc-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Document deleted");

    let deletes: Vec<_> = stub
        .requests()
        .into_iter()
        .filter(|r| r.method == Method::DELETE)
        .collect();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].path, format!("/v2/{KB_PREFIX}/kb1/documents/doc-1"));
}

#[tokio::test]
async fn test_qna_crud() {
    let (_stub, app) = setup().await;

    let (status, body) = app.call(Method::GET, "/qna", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 5);
    assert_eq!(body[1]["userQuestion"], "How are you?");

    let (status, created) = app
        .call(
            Method::POST,
            "/qna",
            Some(json!({"userQuestion": "Do you ship abroad?", "botResponse": "Yes."})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_i64().unwrap();
    assert!(id > 5);
    assert_eq!(created["includeWords"], "");

    let (status, updated) = app
        .call(
            Method::PUT,
            &format!("/qna/{id}"),
            Some(json!({"botResponse": "Yes, to most countries."})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["userQuestion"], "Do you ship abroad?");
    assert_eq!(updated["botResponse"], "Yes, to most countries.");

    let (status, body) = app
        .call(Method::PUT, "/qna/999", Some(json!({"botResponse": "x"})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Not found"}));

    let (status, removed) = app.call(Method::DELETE, &format!("/qna/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["id"], id);

    let (status, _) = app.call(Method::DELETE, &format!("/qna/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.call(Method::GET, "/qna", None).await;
    assert_eq!(body.as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_agent_routes() {
    let (stub, app) = setup().await;

    let (status, body) = app.call(Method::GET, "/agents", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["displayName"], "Store Bot");

    let (status, body) = app
        .call(Method::POST, "/agents", Some(json!({"displayName": "Helper"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["parent"], "projects/demo");
    assert_eq!(body["displayName"], "Helper");

    let (status, body) = app.call(Method::DELETE, "/agents", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Agent config reset successfully."}));

    let (status, body) = app.call(Method::GET, "/agents/list", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let posts = stub
        .requests()
        .into_iter()
        .filter(|r| r.method == Method::POST)
        .count();
    assert_eq!(posts, 2);
}

#[tokio::test]
async fn test_agent_without_project_fails() {
    let stub = VendorStub::default();
    let base = stub.spawn().await;
    let mut config = common::stub_config(&base);
    config.dialogflow.project_id = String::new();
    let app = TestApp::new(config);

    let (status, body) = app.call(Method::GET, "/agents", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body["message"].as_str().unwrap().is_empty());
    assert!(stub.requests().is_empty());
}
