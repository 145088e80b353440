use std::fmt::Display;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{self, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::channel::line::{LineChannel, SIGNATURE_HEADER};
use crate::channel::Channel;
use crate::config::Config;
use crate::error::{ChannelError, KnowledgeError};
use crate::fallback::{FallbackGenerator, GenerativeFallback};
use crate::google::{token_source_from_config, TokenSource, UnconfiguredTokenSource};
use crate::intent::{DialogflowClient, IntentDetector};
use crate::knowledge::{
    model, DocumentSummary, FaqEntry, KnowledgeAdmin, KnowledgeBaseFlags, KnowledgeBaseSummary,
    QnaPatch, QnaStore,
};
use crate::provider;
use crate::resolver::ReplyResolver;
use crate::service::gateway::{BatchScheduler, WebhookStatsSnapshot};
use crate::session::{Clock, ClockSessionIds, SystemClock};

const DIALOGFLOW_TEST_UTTERANCE: &str = "What can you do?";
const DIALOGFLOW_TEST_SESSION: &str = "test-user";
const FALLBACK_TEST_PROMPT: &str = "Explain how AI works in a few words.";
const DEFAULT_PAGE_SIZE: u32 = 10;

/// The pluggable parts of [`AppState`].
pub struct Components {
    pub intent: Arc<dyn IntentDetector>,
    pub fallback: Arc<dyn FallbackGenerator>,
    pub channel: Arc<dyn Channel>,
    pub tokens: Arc<dyn TokenSource>,
    pub clock: Arc<dyn Clock>,
}

impl Components {
    /// Production wiring: Dialogflow, the configured generative provider and LINE push.
    pub fn from_config(config: &Config) -> Self {
        let tokens = token_source_from_config(&config.dialogflow).unwrap_or_else(|e| {
            warn!("Google credentials unavailable: {}", e);
            Arc::new(UnconfiguredTokenSource::new(e.to_string())) as Arc<dyn TokenSource>
        });
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let intent = Arc::new(DialogflowClient::new(
            config.dialogflow.clone(),
            tokens.clone(),
            Arc::new(ClockSessionIds::new(clock.clone())),
        ));

        let kind = config.fallback.provider_kind();
        let api_key = config.fallback_api_key().unwrap_or_else(|| {
            warn!("No API key for {} fallback", kind.label());
            ""
        });
        let llm = provider::create_provider(
            kind,
            api_key,
            config.fallback_api_base(),
            &config.fallback.model,
        );
        let fallback = Arc::new(GenerativeFallback::new(llm, config.fallback.clone()));

        Self {
            intent,
            fallback,
            channel: Arc::new(LineChannel::new(config.line.clone())),
            tokens,
            clock,
        }
    }
}

/// Shared application state for the HTTP API.
pub struct AppState {
    pub config: Config,
    pub intent: Arc<dyn IntentDetector>,
    pub fallback: Arc<dyn FallbackGenerator>,
    pub resolver: ReplyResolver,
    pub scheduler: BatchScheduler,
    pub knowledge: KnowledgeAdmin,
    pub kb_flags: KnowledgeBaseFlags,
    pub qna: QnaStore,
}

impl AppState {
    /// Assemble state from components. Spawns the webhook worker, so it must
    /// run inside a tokio runtime.
    pub fn new(config: Config, components: Components) -> Self {
        let resolver = ReplyResolver::new(components.intent.clone(), components.fallback.clone());
        let scheduler = BatchScheduler::start(
            resolver.clone(),
            components.channel,
            config.gateway.queue_depth,
        );
        let knowledge = KnowledgeAdmin::new(&config.dialogflow, components.tokens);

        Self {
            intent: components.intent,
            fallback: components.fallback,
            resolver,
            scheduler,
            knowledge,
            kb_flags: KnowledgeBaseFlags::new(),
            qna: QnaStore::seeded(components.clock),
            config,
        }
    }

    pub fn from_config(config: Config) -> Self {
        let components = Components::from_config(&config);
        Self::new(config, components)
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub webhook: WebhookStatsSnapshot,
}

/// Create the axum Router with all API routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // LINE
        .route("/webhook", post(handle_webhook))
        // Smoke tests
        .route("/test/dialogflow-test", get(handle_dialogflow_test))
        .route("/test/gemini-test", get(handle_fallback_test))
        // Knowledge bases
        .route("/category", get(handle_list_categories).post(handle_create_category))
        .route(
            "/category/{id}",
            get(handle_get_category)
                .put(handle_update_category)
                .delete(handle_delete_category),
        )
        .route("/category/{id}/enable", patch(handle_enable_category))
        // FAQ documents
        .route("/documents", get(handle_list_documents).post(handle_create_document))
        .route(
            "/documents/{kb_id}/{document_id}",
            get(handle_get_document)
                .put(handle_update_document)
                .delete(handle_delete_document),
        )
        // Q&A
        .route("/qna", get(handle_list_qna).post(handle_create_qna))
        .route("/qna/{id}", put(handle_update_qna).delete(handle_delete_qna))
        // Agent
        .route(
            "/agents",
            get(handle_get_agent)
                .post(handle_set_agent)
                .delete(handle_reset_agent),
        )
        .route("/agents/list", get(handle_list_agents))
        // Health
        .route("/health", get(handle_health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([
                            http::Method::GET,
                            http::Method::POST,
                            http::Method::PUT,
                            http::Method::PATCH,
                            http::Method::DELETE,
                            http::Method::OPTIONS,
                        ])
                        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION]),
                )
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

/// POST /webhook
async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    info!("LINE webhook received: {} bytes", body.len());

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let events = match LineChannel::parse_signed_webhook(
        &state.config.line.channel_secret,
        &body,
        signature,
    ) {
        Ok(events) => events,
        Err(ChannelError::InvalidSignature) => {
            warn!("LINE webhook signature mismatch");
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
        Err(e) => {
            error!("Failed to handle LINE webhook: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Something went wrong"})),
            )
                .into_response();
        }
    };

    state.scheduler.submit(events);
    (StatusCode::OK, "OK").into_response()
}

// ---------------------------------------------------------------------------
// Smoke tests
// ---------------------------------------------------------------------------

/// GET /test/dialogflow-test
async fn handle_dialogflow_test(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let reply = state
        .intent
        .resolve_intent(DIALOGFLOW_TEST_UTTERANCE, DIALOGFLOW_TEST_SESSION)
        .await;
    Json(json!({ "reply": reply }))
}

/// GET /test/gemini-test
async fn handle_fallback_test(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let reply = state.fallback.generate_fallback(FALLBACK_TEST_PROMPT).await;
    Json(json!({ "reply": reply }))
}

// ---------------------------------------------------------------------------
// Management helpers
// ---------------------------------------------------------------------------

fn success(status: StatusCode, message: &str, data: impl Serialize) -> Response {
    (
        status,
        Json(json!({ "success": true, "message": message, "data": data })),
    )
        .into_response()
}

fn failure(status: StatusCode, message: &str, err: impl Display) -> Response {
    (
        status,
        Json(json!({ "success": false, "message": message, "error": err.to_string() })),
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "message": message })),
    )
        .into_response()
}

fn knowledge_failure(message: &str, err: KnowledgeError) -> Response {
    error!("{}: {}", message, err);
    failure(StatusCode::INTERNAL_SERVER_ERROR, message, err)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    page_size: Option<String>,
    page_token: Option<String>,
    filter: Option<String>,
    kb_id: Option<String>,
}

impl ListQuery {
    fn page_size(&self) -> u32 {
        self.page_size
            .as_deref()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    fn page_token(&self) -> Option<&str> {
        self.page_token.as_deref().filter(|t| !t.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Knowledge bases
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateCategoryRequest {
    name: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct UpdateCategoryRequest {
    name: Option<String>,
}

/// GET /category
async fn handle_list_categories(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let page = match state
        .knowledge
        .list_knowledge_bases(query.page_size(), query.page_token())
        .await
    {
        Ok(page) => page,
        Err(e) => return knowledge_failure("Pagination fetch failed", e),
    };

    let filtered = model::filter_by_display_name(page.items, query.filter.as_deref().unwrap_or(""));
    let data: Vec<KnowledgeBaseSummary> = filtered
        .iter()
        .map(|kb| KnowledgeBaseSummary::new(kb, state.kb_flags.is_enabled(&kb.name)))
        .collect();

    Json(json!({
        "success": true,
        "message": "Paginated Knowledge Bases retrieved successfully",
        "data": data,
        "nextPageToken": page.next_page_token,
    }))
    .into_response()
}

/// POST /category
async fn handle_create_category(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCategoryRequest>,
) -> Response {
    let Some(name) = non_blank(req.name) else {
        return bad_request("Missing name");
    };

    match state.knowledge.create_knowledge_base(name.trim()).await {
        Ok(kb) => {
            state.kb_flags.set(&kb.name, req.enabled);
            success(
                StatusCode::CREATED,
                "Knowledge Base created",
                KnowledgeBaseSummary::new(&kb, req.enabled),
            )
        }
        Err(e) => knowledge_failure("Create failed", e),
    }
}

/// GET /category/{id}
async fn handle_get_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.knowledge.get_knowledge_base(&id).await {
        Ok(kb) => {
            let enabled = state.kb_flags.is_enabled(&kb.name);
            success(
                StatusCode::OK,
                "Knowledge Base retrieved",
                KnowledgeBaseSummary::new(&kb, enabled),
            )
        }
        Err(e) => failure(StatusCode::NOT_FOUND, "Not found", e),
    }
}

/// PUT /category/{id}
async fn handle_update_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCategoryRequest>,
) -> Response {
    let Some(name) = non_blank(req.name) else {
        return bad_request("Missing name");
    };

    match state.knowledge.rename_knowledge_base(&id, &name).await {
        Ok(kb) => {
            let enabled = state.kb_flags.is_enabled(&kb.name);
            success(
                StatusCode::OK,
                "Knowledge Base updated",
                KnowledgeBaseSummary::new(&kb, enabled),
            )
        }
        Err(e) => knowledge_failure("Update failed", e),
    }
}

/// DELETE /category/{id}
async fn handle_delete_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.knowledge.delete_knowledge_base(&id).await {
        Ok(()) => {
            state
                .kb_flags
                .remove(&state.knowledge.knowledge_base_name(&id));
            Json(json!({ "success": true, "message": "Knowledge Base deleted" })).into_response()
        }
        Err(e) => knowledge_failure("Delete failed", e),
    }
}

/// PATCH /category/{id}/enable
async fn handle_enable_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let name = state.knowledge.knowledge_base_name(&id);
    state.kb_flags.set(&name, true);
    success(
        StatusCode::OK,
        "KB enabled",
        json!({ "id": id, "enabled": true }),
    )
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDocumentRequest {
    kb_id: Option<String>,
    display_name: Option<String>,
    questions: Option<Vec<FaqEntry>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateDocumentRequest {
    display_name: Option<String>,
    questions: Option<Vec<FaqEntry>>,
}

/// GET /documents?kbId=
async fn handle_list_documents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let Some(kb_id) = non_blank(query.kb_id.clone()) else {
        return bad_request("Knowledge Base ID (kbId) is required");
    };

    match state
        .knowledge
        .list_documents(&kb_id, query.page_size(), query.page_token())
        .await
    {
        Ok(page) => {
            let data: Vec<DocumentSummary> = page.items.iter().map(DocumentSummary::from).collect();
            Json(json!({
                "success": true,
                "data": data,
                "nextPageToken": page.next_page_token,
            }))
            .into_response()
        }
        Err(e) => knowledge_failure("Failed to list documents", e),
    }
}

/// GET /documents/{kb_id}/{document_id}
async fn handle_get_document(
    State(state): State<Arc<AppState>>,
    Path((kb_id, document_id)): Path<(String, String)>,
) -> Response {
    match state.knowledge.get_faq(&kb_id, &document_id).await {
        Ok(faqs) => Json(json!({ "success": true, "data": faqs })).into_response(),
        Err(e) if e.api_status() == Some(404) => {
            failure(StatusCode::NOT_FOUND, "Document not found", e)
        }
        Err(e) => knowledge_failure("Failed to get document", e),
    }
}

/// POST /documents
async fn handle_create_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDocumentRequest>,
) -> Response {
    let (Some(kb_id), Some(display_name), Some(questions)) = (
        non_blank(req.kb_id),
        non_blank(req.display_name),
        req.questions.filter(|q| !q.is_empty()),
    ) else {
        return bad_request("Missing kbId, displayName or questions");
    };

    match state
        .knowledge
        .create_faq_document(&kb_id, &display_name, &questions)
        .await
    {
        Ok(doc) => success(StatusCode::CREATED, "Document created", doc),
        Err(e) => knowledge_failure("Create document failed", e),
    }
}

/// PUT /documents/{kb_id}/{document_id}
async fn handle_update_document(
    State(state): State<Arc<AppState>>,
    Path((kb_id, document_id)): Path<(String, String)>,
    Json(req): Json<UpdateDocumentRequest>,
) -> Response {
    let (Some(display_name), Some(questions)) = (
        non_blank(req.display_name),
        req.questions.filter(|q| !q.is_empty()),
    ) else {
        return bad_request("Missing kbId, documentId, displayName or questions");
    };

    match state
        .knowledge
        .update_faq_document(&kb_id, &document_id, &display_name, &questions)
        .await
    {
        Ok(doc) => success(StatusCode::OK, "Document updated", doc),
        Err(e) => knowledge_failure("Update failed", e),
    }
}

/// DELETE /documents/{kb_id}/{document_id}
async fn handle_delete_document(
    State(state): State<Arc<AppState>>,
    Path((kb_id, document_id)): Path<(String, String)>,
) -> Response {
    match state.knowledge.delete_document(&kb_id, &document_id).await {
        Ok(()) => Json(json!({ "success": true, "message": "Document deleted" })).into_response(),
        Err(e) => knowledge_failure("Delete failed", e),
    }
}

// ---------------------------------------------------------------------------
// Q&A
// ---------------------------------------------------------------------------

fn qna_not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}

/// GET /qna
async fn handle_list_qna(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.qna.list().await)
}

/// POST /qna
async fn handle_create_qna(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<QnaPatch>,
) -> impl IntoResponse {
    (StatusCode::CREATED, Json(state.qna.add(patch).await))
}

/// PUT /qna/{id}
async fn handle_update_qna(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<QnaPatch>,
) -> Response {
    let Ok(id) = id.trim().parse::<i64>() else {
        return qna_not_found();
    };
    match state.qna.update(id, patch).await {
        Some(item) => Json(item).into_response(),
        None => qna_not_found(),
    }
}

/// DELETE /qna/{id}
async fn handle_delete_qna(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let Ok(id) = id.trim().parse::<i64>() else {
        return qna_not_found();
    };
    match state.qna.remove(id).await {
        Some(item) => Json(item).into_response(),
        None => qna_not_found(),
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

fn agent_failure(err: KnowledgeError) -> Response {
    error!("Agent request failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": err.to_string() })),
    )
        .into_response()
}

/// GET /agents
async fn handle_get_agent(State(state): State<Arc<AppState>>) -> Response {
    match state.knowledge.get_agent().await {
        Ok(agent) => Json(agent).into_response(),
        Err(e) => agent_failure(e),
    }
}

/// POST /agents
async fn handle_set_agent(
    State(state): State<Arc<AppState>>,
    Json(agent): Json<Value>,
) -> Response {
    match state.knowledge.set_agent(agent).await {
        Ok(agent) => Json(agent).into_response(),
        Err(e) => agent_failure(e),
    }
}

/// DELETE /agents
async fn handle_reset_agent(State(state): State<Arc<AppState>>) -> Response {
    match state.knowledge.reset_agent().await {
        Ok(_) => Json(json!({ "message": "Agent config reset successfully." })).into_response(),
        Err(e) => agent_failure(e),
    }
}

/// GET /agents/list
async fn handle_list_agents(State(state): State<Arc<AppState>>) -> Response {
    match state.knowledge.search_agents().await {
        Ok(agents) => Json(agents).into_response(),
        Err(e) => agent_failure(e),
    }
}

/// GET /health
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        webhook: state.scheduler.stats(),
    })
}

/// Start the HTTP server on the given address.
pub async fn serve(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_page_size() {
        let q = ListQuery {
            page_size: Some("25".into()),
            ..Default::default()
        };
        assert_eq!(q.page_size(), 25);

        let q = ListQuery {
            page_size: Some("abc".into()),
            ..Default::default()
        };
        assert_eq!(q.page_size(), DEFAULT_PAGE_SIZE);

        let q = ListQuery {
            page_size: Some("0".into()),
            page_token: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(q.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(q.page_token(), None);
    }

    #[test]
    fn test_create_category_defaults_enabled() {
        let req: CreateCategoryRequest = serde_json::from_str(r#"{"name":"FAQ"}"#).unwrap();
        assert!(req.enabled);
        let req: CreateCategoryRequest =
            serde_json::from_str(r#"{"name":"FAQ","enabled":false}"#).unwrap();
        assert!(!req.enabled);
    }
}
