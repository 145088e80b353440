//! Stub vendor server shared by the integration tests.
//!
//! One axum app stands in for Dialogflow, Gemini, the Google token endpoint
//! and the LINE push API. Every request is recorded.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use base64::Engine;
use serde_json::{json, Value};

use linebridge_core::config::Config;

pub const PROJECT: &str = "demo";
pub const LINE_SECRET: &str = "line-secret";
pub const KB_PREFIX: &str = "projects/demo/locations/global/knowledgeBases";

pub const JOKE_REPLY: &str =
    "Why did the robot cross the road?\nTo reach the other side of the data center, obviously.";
/// Prompts starting with this get a safety-blocked candidate.
pub const BLOCKED_PROMPT: &str = "Say something forbidden";
pub const JOKE_REPLY_SANITIZED: &str = "Why did the robot cross the road? To reach the...";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

impl Recorded {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Clone, Default)]
pub struct VendorStub {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl VendorStub {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose path contains `needle`.
    pub fn requests_to(&self, needle: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.contains(needle))
            .collect()
    }

    /// Bind on a free local port and serve in the background.
    pub async fn spawn(&self) -> String {
        let app = Router::new().fallback(vendor).with_state(self.clone());
        serve(app).await
    }
}

/// Serve `app` on 127.0.0.1 with an OS-assigned port.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL nothing listens on.
pub fn dead_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

/// Config whose vendor endpoints all point at `base`.
pub fn stub_config(base: &str) -> Config {
    let mut cfg = Config::default();
    cfg.line.channel_secret = LINE_SECRET.to_string();
    cfg.line.channel_access_token = "line-token".to_string();
    cfg.line.api_base = base.to_string();
    cfg.dialogflow.project_id = PROJECT.to_string();
    cfg.dialogflow.api_base = base.to_string();
    cfg.dialogflow.access_token = Some("google-token".to_string());
    cfg.providers.gemini.api_key = "gemini-key".to_string();
    cfg.providers.gemini.api_base = Some(format!("{base}/v1beta"));
    cfg
}

pub fn b64(text: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(text)
}

async fn vendor(
    State(stub): State<VendorStub>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let recorded = Recorded {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().map(|q| q.to_string()),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
        body: String::from_utf8_lossy(&body).to_string(),
    };
    let json_body = recorded.json();
    let path = recorded.path.clone();
    let token_requests = {
        let mut requests = stub.requests.lock().unwrap();
        requests.push(recorded);
        requests.iter().filter(|r| r.path == "/token").count()
    };

    if path.ends_with(":detectIntent") {
        return Json(detect_intent(&json_body)).into_response();
    }
    if path.ends_with(":generateContent") {
        let prompt = json_body["contents"][0]["parts"][0]["text"].as_str().unwrap_or("");
        if prompt.starts_with(BLOCKED_PROMPT) {
            return Json(json!({
                "candidates": [{"finishReason": "SAFETY", "index": 0}],
                "promptFeedback": {}
            }))
            .into_response();
        }
        return Json(json!({
            "candidates": [{
                "content": {"parts": [{"text": JOKE_REPLY}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 20, "candidatesTokenCount": 18, "totalTokenCount": 38}
        }))
        .into_response();
    }
    if path == "/v2/bot/message/push" {
        return Json(json!({})).into_response();
    }
    if path == "/token" {
        return Json(json!({
            "access_token": format!("ya29.stub-{token_requests}"),
            "expires_in": 3600,
            "token_type": "Bearer"
        }))
        .into_response();
    }

    dialogflow_admin(&method, &path, &json_body)
}

fn detect_intent(body: &Value) -> Value {
    let text = body["queryInput"]["text"]["text"].as_str().unwrap_or("");
    match text {
        "How are you?" => json!({
            "responseId": "r-1",
            "queryResult": {
                "queryText": text,
                "knowledgeAnswers": {"answers": [
                    {"answer": "Not bad.", "matchConfidence": 0.4},
                    {"answer": "I'm great, thanks for asking!", "matchConfidence": 0.9}
                ]},
                "fulfillmentText": "unused",
                "intent": {"displayName": "Knowledge.KnowledgeBase.1", "isFallback": false}
            }
        }),
        "Tell me a joke" => json!({
            "responseId": "r-2",
            "queryResult": {
                "queryText": text,
                "fulfillmentText": "",
                "intent": {"displayName": "Default Fallback Intent", "isFallback": true}
            }
        }),
        _ => json!({
            "responseId": "r-3",
            "queryResult": {
                "queryText": text,
                "fulfillmentMessages": [{"text": {"text": ["I can answer questions about our store."]}}],
                "intent": {"displayName": "capabilities"}
            }
        }),
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": {"code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND"}})),
    )
        .into_response()
}

fn dialogflow_admin(method: &Method, path: &str, body: &Value) -> Response {
    let Some(resource) = path.strip_prefix("/v2/") else {
        return not_found();
    };
    let doc_name = format!("{KB_PREFIX}/kb1/documents/doc-1");
    let operation = "projects/demo/locations/global/operations/op-1";

    match (method.as_str(), resource) {
        ("GET", r) if r == KB_PREFIX => Json(json!({
            "knowledgeBases": [
                {"name": format!("{KB_PREFIX}/kb1"), "displayName": "Billing FAQ", "languageCode": "en"},
                {"name": format!("{KB_PREFIX}/kb2"), "displayName": "Shipping"},
                {"name": format!("{KB_PREFIX}/kb3"), "displayName": "billing errors"}
            ],
            "nextPageToken": "page-2"
        }))
        .into_response(),
        ("POST", r) if r == KB_PREFIX => Json(json!({
            "name": format!("{KB_PREFIX}/kb-new"),
            "displayName": body["displayName"]
        }))
        .into_response(),
        ("GET", r) if r == format!("{KB_PREFIX}/kb1") => Json(json!({
            "name": format!("{KB_PREFIX}/kb1"),
            "displayName": "Billing FAQ"
        }))
        .into_response(),
        ("PATCH", r) if r == format!("{KB_PREFIX}/kb1") => Json(json!({
            "name": format!("{KB_PREFIX}/kb1"),
            "displayName": body["displayName"]
        }))
        .into_response(),
        ("DELETE", r) if r.starts_with(KB_PREFIX) => Json(json!({})).into_response(),
        ("GET", r) if r == format!("{KB_PREFIX}/kb1/documents") => Json(json!({
            "documents": [{
                "name": doc_name,
                "displayName": "faq.csv",
                "mimeType": "text/csv",
                "knowledgeTypes": ["FAQ"]
            }]
        }))
        .into_response(),
        ("POST", r) if r == format!("{KB_PREFIX}/kb1/documents") => {
            Json(json!({"name": operation, "done": false})).into_response()
        }
        ("GET", r) if r == operation => Json(json!({
            "name": operation,
            "done": true,
            "response": {"name": doc_name, "displayName": "faq.csv"}
        }))
        .into_response(),
        ("GET", r) if r == doc_name => Json(json!({
            "name": doc_name,
            "displayName": "faq.csv",
            "rawContent": b64("What is your name?,I am a bot.\n\nHours, 9 to 5 ")
        }))
        .into_response(),
        ("GET", r) if r == format!("{KB_PREFIX}/kb1/documents/empty") => Json(json!({
            "name": format!("{KB_PREFIX}/kb1/documents/empty"),
            "displayName": "empty.csv"
        }))
        .into_response(),
        ("PATCH", r) if r == doc_name => Json(json!({
            "name": operation,
            "done": true,
            "response": {"name": doc_name, "displayName": body["displayName"]}
        }))
        .into_response(),
        ("GET", "projects/demo/agent") => Json(json!({
            "parent": "projects/demo",
            "displayName": "Store Bot",
            "defaultLanguageCode": "en",
            "timeZone": "Asia/Tokyo"
        }))
        .into_response(),
        ("POST", "projects/demo/agent") => Json(body.clone()).into_response(),
        ("GET", "projects/demo/locations/global/agent:search") => Json(json!({
            "agents": [{"parent": "projects/demo", "displayName": "Store Bot"}]
        }))
        .into_response(),
        _ => not_found(),
    }
}
