//! OAuth 2.0 access tokens for the Drive and Sheets APIs.
//!
//! Two long-lived credential kinds are supported, both exchanged at the
//! Google token endpoint for a short-lived bearer token:
//!
//! * **Authorized user**: the `token.json` left behind by an installed-app
//!   consent: client id/secret plus a refresh token. Refreshed tokens are
//!   written back to the file so the next start reuses them.
//! * **Service account**: a key file; a signed RS256 JWT is traded for a
//!   token (the `jwt-bearer` grant).
//!
//! Tokens are cached and reused until one minute before they expire.

use crate::config::CredentialSource;
use crate::error::{PipelineError, RemoteError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Scopes requested for every token: read/write spreadsheets and Drive.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// A token is refreshed once it has less than this left to live.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_LIFETIME_SECS: i64 = 3600;

const SERVICE: &str = "oauth";

/// Source of bearer tokens for the Google clients.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A token valid for at least the next minute.
    async fn access_token(&self) -> Result<String, RemoteError>;
}

impl CredentialSource {
    /// Load the credential and wrap it in the matching [`TokenProvider`].
    pub fn into_provider(
        self,
        http: reqwest::Client,
    ) -> Result<Arc<dyn TokenProvider>, PipelineError> {
        Ok(match self {
            CredentialSource::AuthorizedUser { token_path } => {
                Arc::new(AuthorizedUserToken::load(token_path, http)?)
            }
            CredentialSource::ServiceAccount { key_path } => {
                Arc::new(ServiceAccountToken::load(&key_path, http)?)
            }
            CredentialSource::AccessToken(token) => Arc::new(StaticToken::new(token)?),
        })
    }
}

// ── Static token ─────────────────────────────────────────────────────────

/// A token obtained elsewhere, used as-is until the API rejects it.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Result<Self, PipelineError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(PipelineError::Credentials("access token is empty".into()));
        }
        Ok(Self(token))
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, RemoteError> {
        Ok(self.0.clone())
    }
}

// ── Token endpoint ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

async fn request_token(
    http: &reqwest::Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<CachedToken, RemoteError> {
    let response = http
        .post(token_uri)
        .form(form)
        .send()
        .await
        .map_err(|e| RemoteError::transport(SERVICE, e))?;
    let token: TokenResponse = super::json_body(SERVICE, response).await?;
    let lifetime = token.expires_in.unwrap_or(DEFAULT_LIFETIME_SECS);
    Ok(CachedToken {
        value: token.access_token,
        expires_at: Utc::now() + Duration::seconds(lifetime),
    })
}

// ── Authorized user ──────────────────────────────────────────────────────

/// On-disk layout of `token.json`, as written by Google's client libraries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizedUserFile {
    /// Last access token handed out, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    /// Fields this crate does not use, kept so rewriting the file loses nothing.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl AuthorizedUserFile {
    fn cached(&self) -> Option<CachedToken> {
        Some(CachedToken {
            value: self.token.clone()?,
            expires_at: self.expiry?,
        })
    }
}

/// Refresh-token credential backed by a `token.json` file.
pub struct AuthorizedUserToken {
    path: PathBuf,
    http: reqwest::Client,
    state: Mutex<AuthorizedUserFile>,
}

impl AuthorizedUserToken {
    pub fn load(path: impl Into<PathBuf>, http: reqwest::Client) -> Result<Self, PipelineError> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            PipelineError::Credentials(format!("cannot read {}: {e}", path.display()))
        })?;
        let file: AuthorizedUserFile = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::Credentials(format!("{} is not an authorized-user file: {e}", path.display()))
        })?;
        if file.refresh_token.is_empty() {
            return Err(PipelineError::Credentials(format!(
                "{} has no refresh token; run the consent flow again",
                path.display()
            )));
        }
        debug!("Loaded authorized-user credentials from {}", path.display());
        Ok(Self {
            path,
            http,
            state: Mutex::new(file),
        })
    }

    async fn persist(&self, file: &AuthorizedUserFile) {
        let json = match serde_json::to_string_pretty(file) {
            Ok(json) => json,
            Err(e) => {
                warn!("Could not serialise refreshed token: {}", e);
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&self.path, json).await {
            warn!("Could not save refreshed token to {}: {}", self.path.display(), e);
        }
    }
}

#[async_trait]
impl TokenProvider for AuthorizedUserToken {
    async fn access_token(&self) -> Result<String, RemoteError> {
        let mut file = self.state.lock().await;
        if let Some(cached) = file.cached().filter(|c| c.is_fresh(Utc::now())) {
            return Ok(cached.value);
        }

        info!("Refreshing Google access token");
        let fresh = request_token(
            &self.http,
            &file.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", file.client_id.as_str()),
                ("client_secret", file.client_secret.as_str()),
                ("refresh_token", file.refresh_token.as_str()),
            ],
        )
        .await?;

        file.token = Some(fresh.value.clone());
        file.expiry = Some(fresh.expires_at);
        self.persist(&file).await;
        Ok(fresh.value)
    }
}

// ── Service account ──────────────────────────────────────────────────────

/// The fields of a service-account key file that the JWT grant needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// JWT claim set for the `jwt-bearer` grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl JwtClaims {
    /// Claims valid for one hour from `now`.
    pub fn new(key: &ServiceAccountKey, now: DateTime<Utc>) -> Self {
        let iat = now.timestamp();
        Self {
            iss: key.client_email.clone(),
            scope: SCOPES.join(" "),
            aud: key.token_uri.clone(),
            iat,
            exp: iat + DEFAULT_LIFETIME_SECS,
        }
    }
}

/// Service-account credential: signs its own assertions.
pub struct ServiceAccountToken {
    key: ServiceAccountKey,
    signing_key: jsonwebtoken::EncodingKey,
    http: reqwest::Client,
    cache: Mutex<Option<CachedToken>>,
}

impl ServiceAccountToken {
    pub fn load(path: &Path, http: reqwest::Client) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Credentials(format!("cannot read {}: {e}", path.display()))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::Credentials(format!("{} is not a service-account key: {e}", path.display()))
        })?;
        Self::from_key(key, http)
    }

    pub fn from_key(key: ServiceAccountKey, http: reqwest::Client) -> Result<Self, PipelineError> {
        let signing_key = jsonwebtoken::EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| PipelineError::Credentials(format!("invalid private key: {e}")))?;
        debug!("Loaded service account {}", key.client_email);
        Ok(Self {
            key,
            signing_key,
            http,
            cache: Mutex::new(None),
        })
    }

    /// Signed assertion for the token request.
    pub fn assertion(&self, now: DateTime<Utc>) -> Result<String, RemoteError> {
        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        jsonwebtoken::encode(&header, &JwtClaims::new(&self.key, now), &self.signing_key).map_err(
            |e| RemoteError::Decode {
                service: SERVICE,
                detail: format!("cannot sign assertion: {e}"),
            },
        )
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountToken {
    async fn access_token(&self) -> Result<String, RemoteError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh(Utc::now())) {
            return Ok(cached.value.clone());
        }

        info!("Requesting access token for {}", self.key.client_email);
        let assertion = self.assertion(Utc::now())?;
        let fresh = request_token(
            &self.http,
            &self.key.token_uri,
            &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
        )
        .await?;
        let value = fresh.value.clone();
        *cache = Some(fresh);
        Ok(value)
    }
}
