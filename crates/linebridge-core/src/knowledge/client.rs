use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::DialogflowConfig;
use crate::error::KnowledgeError;
use crate::google::TokenSource;
use crate::provider::api_error_message;
use crate::util::http;

use super::faq::{self, FaqEntry, FAQ_MIME_TYPE};
use super::model::{Document, KnowledgeBase, Page};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_POLL_ATTEMPTS: u32 = 60;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListKnowledgeBasesResponse {
    knowledge_bases: Vec<KnowledgeBase>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListDocumentsResponse {
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Operation {
    name: String,
    done: bool,
    response: Option<Value>,
    error: Option<OperationStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OperationStatus {
    code: i32,
    message: String,
}

/// REST proxy over the Dialogflow v2 knowledge-base, document and agent APIs.
pub struct KnowledgeAdmin {
    api_base: String,
    project_id: String,
    location: String,
    tokens: Arc<dyn TokenSource>,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl KnowledgeAdmin {
    pub fn new(config: &DialogflowConfig, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            location: config.location.clone(),
            tokens,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }

    /// Override how long-running operations are polled. `attempts` is the
    /// number of status requests made before giving up.
    pub fn with_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.project_id, self.location)
    }

    /// Full resource name of a knowledge base.
    pub fn knowledge_base_name(&self, kb_id: &str) -> String {
        format!("{}/knowledgeBases/{}", self.parent(), kb_id)
    }

    /// Full resource name of a document.
    pub fn document_name(&self, kb_id: &str, document_id: &str) -> String {
        format!("{}/documents/{}", self.knowledge_base_name(kb_id), document_id)
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, KnowledgeError> {
        if self.project_id.is_empty() {
            return Err(KnowledgeError::NoProject);
        }

        let url = format!("{}/v2/{}", self.api_base, path);
        let token = self.tokens.access_token().await?;
        debug!("Dialogflow {} {}", method, url);

        let mut request = http::client()
            .request(method, &url)
            .bearer_auth(token)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = http::error_body(response).await;
            return Err(KnowledgeError::Api {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| KnowledgeError::Parse(e.to_string()))
    }

    async fn call_as<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<T, KnowledgeError> {
        let value = self.call(method, path, query, body).await?;
        serde_json::from_value(value).map_err(|e| KnowledgeError::Parse(e.to_string()))
    }

    fn page_query(page_size: u32, page_token: Option<&str>) -> Vec<(&'static str, String)> {
        let mut query = vec![("pageSize", page_size.to_string())];
        if let Some(token) = page_token.filter(|t| !t.is_empty()) {
            query.push(("pageToken", token.to_string()));
        }
        query
    }

    /// Poll a long-running operation until it finishes.
    async fn wait_for_operation(&self, op: Value) -> Result<Value, KnowledgeError> {
        let mut op: Operation =
            serde_json::from_value(op).map_err(|e| KnowledgeError::Parse(e.to_string()))?;

        let mut polls = 0;
        loop {
            if op.done {
                if let Some(status) = op.error {
                    return Err(KnowledgeError::OperationFailed(format!(
                        "{} (code {})",
                        status.message, status.code
                    )));
                }
                return Ok(op.response.unwrap_or(Value::Null));
            }
            if op.name.is_empty() {
                return Err(KnowledgeError::Parse("operation has no name".to_string()));
            }
            if polls >= self.poll_attempts {
                warn!("Gave up waiting for operation {}", op.name);
                return Err(KnowledgeError::OperationTimeout(op.name));
            }
            polls += 1;
            debug!("Operation {} pending (poll {})", op.name, polls);
            tokio::time::sleep(self.poll_interval).await;
            op = self.call_as(Method::GET, &op.name, &[], None).await?;
        }
    }

    // ====== Knowledge bases ======

    pub async fn list_knowledge_bases(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Page<KnowledgeBase>, KnowledgeError> {
        let path = format!("{}/knowledgeBases", self.parent());
        let resp: ListKnowledgeBasesResponse = self
            .call_as(Method::GET, &path, &Self::page_query(page_size, page_token), None)
            .await?;
        Ok(Page {
            items: resp.knowledge_bases,
            next_page_token: resp.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    pub async fn create_knowledge_base(
        &self,
        display_name: &str,
    ) -> Result<KnowledgeBase, KnowledgeError> {
        let path = format!("{}/knowledgeBases", self.parent());
        let body = json!({ "displayName": display_name });
        let kb: KnowledgeBase = self.call_as(Method::POST, &path, &[], Some(&body)).await?;
        info!("Created knowledge base {}", kb.name);
        Ok(kb)
    }

    pub async fn get_knowledge_base(&self, kb_id: &str) -> Result<KnowledgeBase, KnowledgeError> {
        self.call_as(Method::GET, &self.knowledge_base_name(kb_id), &[], None)
            .await
    }

    /// Set a knowledge base's display name (trimmed).
    pub async fn rename_knowledge_base(
        &self,
        kb_id: &str,
        display_name: &str,
    ) -> Result<KnowledgeBase, KnowledgeError> {
        let name = self.knowledge_base_name(kb_id);
        let body = json!({ "name": name, "displayName": display_name.trim() });
        self.call_as(
            Method::PATCH,
            &name,
            &[("updateMask", "displayName".to_string())],
            Some(&body),
        )
        .await
    }

    pub async fn delete_knowledge_base(&self, kb_id: &str) -> Result<(), KnowledgeError> {
        self.call(Method::DELETE, &self.knowledge_base_name(kb_id), &[], None)
            .await?;
        info!("Deleted knowledge base {}", kb_id);
        Ok(())
    }

    // ====== Documents ======

    pub async fn list_documents(
        &self,
        kb_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Page<Document>, KnowledgeError> {
        let path = format!("{}/documents", self.knowledge_base_name(kb_id));
        let resp: ListDocumentsResponse = self
            .call_as(Method::GET, &path, &Self::page_query(page_size, page_token), None)
            .await?;
        Ok(Page {
            items: resp.documents,
            next_page_token: resp.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    pub async fn get_document(
        &self,
        kb_id: &str,
        document_id: &str,
    ) -> Result<Document, KnowledgeError> {
        self.call_as(Method::GET, &self.document_name(kb_id, document_id), &[], None)
            .await
    }

    /// Fetch a document and decode its FAQ pairs.
    pub async fn get_faq(
        &self,
        kb_id: &str,
        document_id: &str,
    ) -> Result<Vec<FaqEntry>, KnowledgeError> {
        let doc = self.get_document(kb_id, document_id).await?;
        faq::from_raw_content(doc.raw_content.as_deref())
    }

    /// Create an FAQ document and wait for Dialogflow to finish importing it.
    pub async fn create_faq_document(
        &self,
        kb_id: &str,
        display_name: &str,
        entries: &[FaqEntry],
    ) -> Result<Value, KnowledgeError> {
        let doc = Document {
            display_name: display_name.to_string(),
            mime_type: FAQ_MIME_TYPE.to_string(),
            knowledge_types: vec!["FAQ".to_string()],
            raw_content: Some(faq::to_raw_content(entries)?),
            ..Default::default()
        };
        let body = serde_json::to_value(&doc).map_err(|e| KnowledgeError::Parse(e.to_string()))?;
        let path = format!("{}/documents", self.knowledge_base_name(kb_id));

        let op = self.call(Method::POST, &path, &[], Some(&body)).await?;
        let created = self.wait_for_operation(op).await?;
        info!("Created FAQ document '{}' in {}", display_name, kb_id);
        Ok(created)
    }

    /// Replace an FAQ document's display name and content.
    pub async fn update_faq_document(
        &self,
        kb_id: &str,
        document_id: &str,
        display_name: &str,
        entries: &[FaqEntry],
    ) -> Result<Value, KnowledgeError> {
        let name = self.document_name(kb_id, document_id);
        let body = json!({
            "name": name,
            "displayName": display_name,
            "rawContent": faq::to_raw_content(entries)?,
        });
        let op = self
            .call(
                Method::PATCH,
                &name,
                &[("updateMask", "displayName,rawContent".to_string())],
                Some(&body),
            )
            .await?;
        self.wait_for_operation(op).await
    }

    pub async fn delete_document(&self, kb_id: &str, document_id: &str) -> Result<(), KnowledgeError> {
        self.call(Method::DELETE, &self.document_name(kb_id, document_id), &[], None)
            .await?;
        info!("Deleted document {} from {}", document_id, kb_id);
        Ok(())
    }

    // ====== Agent ======

    fn agent_path(&self) -> String {
        format!("projects/{}/agent", self.project_id)
    }

    pub async fn get_agent(&self) -> Result<Value, KnowledgeError> {
        self.call(Method::GET, &self.agent_path(), &[], None).await
    }

    /// Create or update the agent. `parent` is always this project.
    pub async fn set_agent(&self, mut agent: Value) -> Result<Value, KnowledgeError> {
        if !agent.is_object() {
            agent = json!({});
        }
        agent["parent"] = json!(format!("projects/{}", self.project_id));
        self.call(Method::POST, &self.agent_path(), &[], Some(&agent))
            .await
    }

    /// Dialogflow cannot delete an agent; blank its settings instead.
    pub async fn reset_agent(&self) -> Result<Value, KnowledgeError> {
        self.set_agent(json!({
            "displayName": "",
            "defaultLanguageCode": "",
            "timeZone": "",
            "description": "",
            "avatarUri": "",
            "enableLogging": false,
        }))
        .await
    }

    pub async fn search_agents(&self) -> Result<Vec<Value>, KnowledgeError> {
        let path = format!("{}/agent:search", self.parent());
        let resp = self.call(Method::GET, &path, &[], None).await?;
        Ok(resp
            .get("agents")
            .and_then(|a| a.as_array())
            .cloned()
            .unwrap_or_default())
    }
}
