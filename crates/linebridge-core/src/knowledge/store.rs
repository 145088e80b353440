//! Process-local state owned by the HTTP service.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::session::Clock;

/// Enabled flags for knowledge bases, keyed by resource name.
///
/// Dialogflow has no such field, so the flag lives here. Unknown names are
/// enabled.
#[derive(Debug, Default)]
pub struct KnowledgeBaseFlags {
    flags: DashMap<String, bool>,
}

impl KnowledgeBaseFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.flags.get(name).map(|v| *v).unwrap_or(true)
    }

    pub fn set(&self, name: &str, enabled: bool) {
        self.flags.insert(name.to_string(), enabled);
    }

    pub fn remove(&self, name: &str) {
        self.flags.remove(name);
    }
}

/// A canned question/answer pair shown in the admin UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QnaItem {
    pub id: i64,
    #[serde(default)]
    pub user_question: String,
    #[serde(default)]
    pub bot_response: String,
    #[serde(default)]
    pub include_words: String,
    #[serde(default)]
    pub start_with: String,
}

/// Fields accepted when creating or updating an item. Absent fields are left
/// untouched on update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QnaPatch {
    pub user_question: Option<String>,
    pub bot_response: Option<String>,
    pub include_words: Option<String>,
    pub start_with: Option<String>,
}

impl QnaItem {
    fn apply(&mut self, patch: QnaPatch) {
        if let Some(v) = patch.user_question {
            self.user_question = v;
        }
        if let Some(v) = patch.bot_response {
            self.bot_response = v;
        }
        if let Some(v) = patch.include_words {
            self.include_words = v;
        }
        if let Some(v) = patch.start_with {
            self.start_with = v;
        }
    }
}

fn seed() -> Vec<QnaItem> {
    [
        (1, "What is your name?", "I am a bot.", "name", "What"),
        (2, "How are you?", "I'm fine, thanks!", "fine, thanks", "How"),
        (3, "Where do you live?", "I live on the internet.", "live", "Where"),
        (4, "What time is it?", "I don't have a clock.", "time", "What"),
        (5, "Can you help me?", "Sure, how can I assist you?", "help, assist", "Can"),
    ]
    .into_iter()
    .map(|(id, q, a, words, start)| QnaItem {
        id,
        user_question: q.to_string(),
        bot_response: a.to_string(),
        include_words: words.to_string(),
        start_with: start.to_string(),
    })
    .collect()
}

/// In-memory Q&A list. New ids come from the clock in millis, bumped past
/// the current maximum if two adds land in the same millisecond.
pub struct QnaStore {
    items: RwLock<Vec<QnaItem>>,
    clock: Arc<dyn Clock>,
}

impl QnaStore {
    /// Store seeded with the five demo items.
    pub fn seeded(clock: Arc<dyn Clock>) -> Self {
        Self {
            items: RwLock::new(seed()),
            clock,
        }
    }

    pub async fn list(&self) -> Vec<QnaItem> {
        self.items.read().await.clone()
    }

    pub async fn add(&self, patch: QnaPatch) -> QnaItem {
        let mut items = self.items.write().await;
        let max_id = items.iter().map(|i| i.id).max().unwrap_or(0);
        let id = self.clock.now_millis().max(max_id + 1);

        let mut item = QnaItem {
            id,
            user_question: String::new(),
            bot_response: String::new(),
            include_words: String::new(),
            start_with: String::new(),
        };
        item.apply(patch);
        items.push(item.clone());
        item
    }

    /// Merge `patch` into the item with `id`. `None` if it does not exist.
    pub async fn update(&self, id: i64, patch: QnaPatch) -> Option<QnaItem> {
        let mut items = self.items.write().await;
        let item = items.iter_mut().find(|i| i.id == id)?;
        item.apply(patch);
        Some(item.clone())
    }

    /// Remove and return the item with `id`.
    pub async fn remove(&self, id: i64) -> Option<QnaItem> {
        let mut items = self.items.write().await;
        let idx = items.iter().position(|i| i.id == id)?;
        Some(items.remove(idx))
    }
}
