use std::path::PathBuf;

/// Core error types for linebridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Intent error: {0}")]
    Intent(#[from] IntentError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No API key configured")]
    NoApiKey,
}

/// Errors from generative model providers and Google credential exchange.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("No API key configured for provider")]
    NoApiKey,

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("Response blocked: {0}")]
    Blocked(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Dialogflow API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Missing queryResult in detectIntent response")]
    MissingResult,

    #[error("No Dialogflow project configured")]
    NoProject,

    #[error("Credential error: {0}")]
    Credentials(#[from] ProviderError),
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Signature verification failed")]
    InvalidSignature,

    #[error("Malformed webhook body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("Send error: {0}")]
    Send(String),

    #[error("{0}")]
    Other(String),
}

/// Errors from the knowledge-base, document and agent management proxies.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Dialogflow API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Credential error: {0}")]
    Credentials(#[from] ProviderError),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("No raw content found in the document.")]
    NoRawContent,

    #[error("Invalid document content: {0}")]
    InvalidContent(String),

    #[error("Operation {0} did not complete")]
    OperationTimeout(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("No Dialogflow project configured")]
    NoProject,
}

impl KnowledgeError {
    /// HTTP status reported by Dialogflow, if the failure came from the API.
    pub fn api_status(&self) -> Option<u16> {
        match self {
            KnowledgeError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
