use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Root configuration for linebridge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub line: LineConfig,
    pub dialogflow: DialogflowConfig,
    pub providers: ProvidersConfig,
    pub fallback: FallbackConfig,
    pub gateway: GatewayConfig,
}

impl Config {
    /// API key for the configured fallback provider, if any.
    pub fn fallback_api_key(&self) -> Option<&str> {
        let provider = match self.fallback.provider_kind() {
            FallbackProvider::Gemini => &self.providers.gemini,
            FallbackProvider::OpenAi => &self.providers.openai,
        };
        if provider.api_key.is_empty() {
            None
        } else {
            Some(&provider.api_key)
        }
    }

    /// API base override for the configured fallback provider.
    pub fn fallback_api_base(&self) -> Option<&str> {
        match self.fallback.provider_kind() {
            FallbackProvider::Gemini => self.providers.gemini.api_base.as_deref(),
            FallbackProvider::OpenAi => self.providers.openai.api_base.as_deref(),
        }
    }

    /// Socket address the HTTP server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.gateway.host, self.gateway.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LineConfig {
    pub channel_secret: String,
    pub channel_access_token: String,
    pub api_base: String,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_secret: String::new(),
            channel_access_token: String::new(),
            api_base: "https://api.line.me".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogflowConfig {
    pub project_id: String,
    pub location: String,
    pub language_code: String,
    pub api_base: String,
    /// Service-account key file (GOOGLE_APPLICATION_CREDENTIALS).
    pub credentials_file: Option<String>,
    /// Pre-minted bearer token; wins over the key file when set.
    pub access_token: Option<String>,
}

impl Default for DialogflowConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            location: "global".to_string(),
            language_code: "en-US".to_string(),
            api_base: "https://dialogflow.googleapis.com".to_string(),
            credentials_file: None,
            access_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub gemini: ProviderConfig,
    pub openai: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_base: Option<String>,
}

/// Which generative provider answers fallback intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackProvider {
    Gemini,
    OpenAi,
}

impl FallbackProvider {
    /// Human-facing name used in the failure reply.
    pub fn label(&self) -> &'static str {
        match self {
            FallbackProvider::Gemini => "Gemini",
            FallbackProvider::OpenAi => "OpenAI",
        }
    }
}

impl std::str::FromStr for FallbackProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(FallbackProvider::Gemini),
            "openai" | "gpt" => Ok(FallbackProvider::OpenAi),
            other => Err(ConfigError::Invalid(format!(
                "unknown fallback provider: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FallbackConfig {
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub max_words: usize,
    pub system_prompt: Option<String>,
}

impl FallbackConfig {
    /// Parsed provider; unknown names fall back to Gemini.
    pub fn provider_kind(&self) -> FallbackProvider {
        self.provider.parse().unwrap_or_else(|e| {
            tracing::warn!("{}; using Gemini", e);
            FallbackProvider::Gemini
        })
    }

    /// Defaults matching the OpenAI chat path.
    pub fn openai() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 200,
            temperature: 0.7,
            max_words: 10,
            system_prompt: Some("You are a helpful and friendly assistant.".to_string()),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.0-flash".to_string(),
            max_tokens: 50,
            temperature: 0.7,
            max_words: 10,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Webhook batches that may wait for the background worker.
    pub queue_depth: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            queue_depth: 64,
        }
    }
}

// ====== Config loading/saving ======

/// Load configuration from environment variables.
///
/// Priority:
/// 1. `LINEBRIDGE_CONFIG` env var: full JSON config
/// 2. File (`~/.linebridge/config.json` or `config_path`) with individual env
///    vars merged on top
pub fn load_config_from_env(config_path: Option<&Path>) -> Config {
    if let Ok(json) = std::env::var("LINEBRIDGE_CONFIG") {
        match serde_json::from_str::<Config>(&json) {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!("Failed to parse LINEBRIDGE_CONFIG: {}", e);
            }
        }
    }

    let mut cfg = load_config(config_path);
    apply_env_overrides(&mut cfg);
    cfg
}

fn apply_env_overrides(cfg: &mut Config) {
    // LINE
    if let Ok(v) = std::env::var("LINE_CHANNEL_SECRET") {
        cfg.line.channel_secret = v;
    }
    if let Ok(v) = std::env::var("LINE_CHANNEL_ACCESS_TOKEN") {
        cfg.line.channel_access_token = v;
    }
    if let Ok(v) = std::env::var("LINE_API_BASE") {
        cfg.line.api_base = v;
    }

    // Dialogflow
    if let Ok(v) = std::env::var("DIALOGFLOW_PROJECT_ID") {
        cfg.dialogflow.project_id = v;
    }
    if let Ok(v) = std::env::var("DIALOGFLOW_LANGUAGE_CODE") {
        cfg.dialogflow.language_code = v;
    }
    if let Ok(v) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
        cfg.dialogflow.credentials_file = Some(v);
    }
    if let Ok(v) = std::env::var("GOOGLE_ACCESS_TOKEN") {
        cfg.dialogflow.access_token = Some(v);
    }

    // Provider keys (GEMINI_API_KEY wins over the older name)
    if let Ok(v) = std::env::var("GOOGLE_GENAI_API_KEY") {
        cfg.providers.gemini.api_key = v;
    }
    if let Ok(v) = std::env::var("GEMINI_API_KEY") {
        cfg.providers.gemini.api_key = v;
    }
    if let Ok(v) = std::env::var("OPENAI_API_KEY") {
        cfg.providers.openai.api_key = v;
    }

    // Fallback
    if let Ok(v) = std::env::var("FALLBACK_PROVIDER") {
        match v.parse::<FallbackProvider>() {
            Ok(FallbackProvider::OpenAi) => cfg.fallback = FallbackConfig::openai(),
            Ok(FallbackProvider::Gemini) => cfg.fallback = FallbackConfig::default(),
            Err(e) => tracing::warn!("Ignoring FALLBACK_PROVIDER: {}", e),
        }
    }
    if let Ok(v) = std::env::var("FALLBACK_MODEL") {
        cfg.fallback.model = v;
    }

    // Gateway
    if let Ok(v) = std::env::var("PORT") {
        match v.parse() {
            Ok(port) => cfg.gateway.port = port,
            Err(e) => tracing::warn!("Ignoring PORT={}: {}", v, e),
        }
    }
}

/// Get the default configuration file path.
pub fn get_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".linebridge")
        .join("config.json")
}

/// Load configuration from file or create default.
pub fn load_config(config_path: Option<&Path>) -> Config {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Config>(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config from {}: {}", path.display(), e);
                    tracing::warn!("Using default configuration.");
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config from {}: {}", path.display(), e);
                tracing::warn!("Using default configuration.");
            }
        }
    }

    Config::default()
}

/// Save configuration to file.
pub fn save_config(config: &Config, config_path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(path)
}
