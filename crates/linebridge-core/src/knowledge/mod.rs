//! Knowledge-base administration: Dialogflow knowledge bases, FAQ documents,
//! agent settings, plus the locally owned Q&A list and enabled flags.

pub mod client;
pub mod faq;
pub mod model;
pub mod store;

pub use client::KnowledgeAdmin;
pub use faq::FaqEntry;
pub use model::{Document, DocumentSummary, KnowledgeBase, KnowledgeBaseSummary, Page};
pub use store::{KnowledgeBaseFlags, QnaItem, QnaPatch, QnaStore};
