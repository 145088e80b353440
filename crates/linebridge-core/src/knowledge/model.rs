use serde::{Deserialize, Serialize};

use crate::util::resource_id;

const DEFAULT_LANGUAGE: &str = "en-US";

/// Dialogflow `KnowledgeBase` resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KnowledgeBase {
    pub name: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

/// Dialogflow `Document` resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mime_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub knowledge_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

/// One page of a list call.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

/// Knowledge base as returned to admin clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseSummary {
    pub name: String,
    pub id: String,
    pub display_name: String,
    pub language_code: String,
    pub enabled: bool,
}

impl KnowledgeBaseSummary {
    pub fn new(kb: &KnowledgeBase, enabled: bool) -> Self {
        Self {
            name: kb.display_name.clone(),
            id: resource_id(&kb.name).to_string(),
            display_name: kb.display_name.clone(),
            language_code: kb
                .language_code
                .clone()
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            enabled,
        }
    }
}

/// Document as returned to admin clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub display_name: String,
    pub id: String,
    pub knowledge_types: Vec<String>,
    pub language_code: String,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            display_name: doc.display_name.clone(),
            id: resource_id(&doc.name).to_string(),
            knowledge_types: doc.knowledge_types.clone(),
            language_code: doc
                .language_code
                .clone()
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        }
    }
}

/// Keep knowledge bases whose display name contains `filter`, ignoring case.
/// A blank filter keeps everything.
pub fn filter_by_display_name(kbs: Vec<KnowledgeBase>, filter: &str) -> Vec<KnowledgeBase> {
    let needle = filter.trim().to_lowercase();
    if needle.is_empty() {
        return kbs;
    }
    kbs.into_iter()
        .filter(|kb| kb.display_name.to_lowercase().contains(&needle))
        .collect()
}
