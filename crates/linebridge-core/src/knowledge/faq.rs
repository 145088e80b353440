//! FAQ documents: `question,answer` CSV carried as base64 `rawContent`.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::KnowledgeError;

pub const UNKNOWN_QUESTION: &str = "Unknown question";
pub const UNKNOWN_ANSWER: &str = "Unknown answer";

/// MIME type Dialogflow expects for FAQ documents.
pub const FAQ_MIME_TYPE: &str = "text/csv";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

impl FaqEntry {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Render entries as header-less CSV, one pair per line.
pub fn encode_csv(entries: &[FaqEntry]) -> Result<String, KnowledgeError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    for entry in entries {
        writer
            .write_record([entry.question.as_str(), entry.answer.as_str()])
            .map_err(|e| KnowledgeError::InvalidContent(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| KnowledgeError::InvalidContent(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|e| KnowledgeError::InvalidContent(e.to_string()))?;
    Ok(text.trim_end_matches('\n').to_string())
}

/// Parse CSV into entries. Cells are trimmed, blank lines skipped, and
/// missing or empty cells replaced with placeholders.
pub fn decode_csv(text: &str) -> Result<Vec<FaqEntry>, KnowledgeError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| KnowledgeError::InvalidContent(e.to_string()))?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        let cell = |i: usize, default: &str| {
            record
                .get(i)
                .filter(|c| !c.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        entries.push(FaqEntry {
            question: cell(0, UNKNOWN_QUESTION),
            answer: cell(1, UNKNOWN_ANSWER),
        });
    }
    Ok(entries)
}

/// CSV → base64 for a document's `rawContent`.
pub fn to_raw_content(entries: &[FaqEntry]) -> Result<String, KnowledgeError> {
    let csv = encode_csv(entries)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(csv.as_bytes()))
}

/// Decode a document's base64 `rawContent` into entries.
pub fn from_raw_content(raw_content: Option<&str>) -> Result<Vec<FaqEntry>, KnowledgeError> {
    let raw = raw_content
        .filter(|r| !r.is_empty())
        .ok_or(KnowledgeError::NoRawContent)?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw)
        .map_err(|e| KnowledgeError::InvalidContent(format!("rawContent is not base64: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| KnowledgeError::InvalidContent(format!("rawContent is not UTF-8: {e}")))?;
    decode_csv(&text)
}
