use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::DialogflowConfig;
use crate::error::ProviderError;
use crate::session::{Clock, SystemClock};
use crate::util::http;

/// OAuth scope covering Dialogflow.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

/// Yields bearer tokens for Google APIs.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, ProviderError>;
}

/// A fixed token, e.g. from `gcloud auth print-access-token`.
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String, ProviderError> {
        if self.token.is_empty() {
            return Err(ProviderError::Credentials("empty access token".to_string()));
        }
        Ok(self.token.clone())
    }
}

/// Stands in when no credentials are configured; every call fails.
pub struct UnconfiguredTokenSource {
    reason: String,
}

impl UnconfiguredTokenSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TokenSource for UnconfiguredTokenSource {
    async fn access_token(&self) -> Result<String, ProviderError> {
        Err(ProviderError::Credentials(self.reason.clone()))
    }
}

/// The fields of a service-account key file we need.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, ProviderError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::Credentials(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| ProviderError::Credentials(format!("invalid key file: {}", e)))
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

struct CachedToken {
    token: String,
    expires_at: i64,
}

/// Exchanges a signed JWT assertion for an access token and caches it.
pub struct ServiceAccountTokenSource {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    pub fn new(key: ServiceAccountKey) -> Result<Self, ProviderError> {
        Self::with_clock(key, Arc::new(SystemClock))
    }

    pub fn with_clock(key: ServiceAccountKey, clock: Arc<dyn Clock>) -> Result<Self, ProviderError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| ProviderError::Credentials(format!("invalid private key: {}", e)))?;
        Ok(Self {
            key,
            encoding_key,
            clock,
            cached: Mutex::new(None),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ProviderError> {
        Self::new(ServiceAccountKey::from_file(path)?)
    }

    fn now_secs(&self) -> i64 {
        self.clock.now_millis() / 1000
    }

    fn assertion(&self, now: i64) -> Result<String, ProviderError> {
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| ProviderError::Credentials(format!("failed to sign assertion: {}", e)))
    }

    async fn fetch(&self, now: i64) -> Result<CachedToken, ProviderError> {
        let assertion = self.assertion(now)?;
        debug!("Requesting Google access token for {}", self.key.client_email);

        let response = http::client()
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: http::error_body(response).await,
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(CachedToken {
            token: body.access_token,
            expires_at: now + body.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.cached.lock().await;
        let now = self.now_secs();

        if let Some(token) = cached.as_ref() {
            if now < token.expires_at - REFRESH_MARGIN_SECS {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.fetch(now).await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

/// Pick a token source: explicit access token first, then a key file.
pub fn token_source_from_config(
    config: &DialogflowConfig,
) -> Result<Arc<dyn TokenSource>, ProviderError> {
    if let Some(token) = config.access_token.as_deref().filter(|t| !t.is_empty()) {
        info!("Using static Google access token");
        return Ok(Arc::new(StaticTokenSource::new(token)));
    }
    if let Some(path) = config.credentials_file.as_deref().filter(|p| !p.is_empty()) {
        info!("Using service account credentials from {}", path);
        return Ok(Arc::new(ServiceAccountTokenSource::from_file(Path::new(path))?));
    }
    Err(ProviderError::Credentials(
        "set GOOGLE_ACCESS_TOKEN or GOOGLE_APPLICATION_CREDENTIALS".to_string(),
    ))
}
