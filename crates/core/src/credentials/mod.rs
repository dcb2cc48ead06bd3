//! File-backed credential store with bearer-token caching.
//!
//! The store holds the Azure AD application credentials (tenant id,
//! client id, client secret), a cached bearer token with its expiry, and
//! any number of extra keys such as the Power BI workspace and report
//! ids. [`CredentialStore::load`] refreshes the token through a
//! [`TokenProvider`] when it has expired and rewrites the file
//! atomically, preserving every non-bearer entry verbatim.
//!
//! Two on-disk formats are supported, chosen by file extension: see
//! [`StoreFormat`].

mod format;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use format::StoreFormat;

/// Key of the tenant id entry.
pub const KEY_TENANT_ID: &str = "tenant_id";
/// Key of the client id entry.
pub const KEY_CLIENT_ID: &str = "client_id";
/// Key of the client secret entry.
pub const KEY_CLIENT_SECRET: &str = "client_secret";
/// Key of the cached bearer token entry.
pub const KEY_BEARER: &str = "bearer";

/// Lifetime assigned to a freshly issued token.
pub const TOKEN_LIFETIME_HOURS: i64 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Failed to access credential store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed credential store line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Invalid bearer expiry '{value}' on line {line}")]
    InvalidExpiry { line: usize, value: String },

    #[error("Credential store is missing required key '{0}'")]
    MissingKey(String),

    #[error("Invalid JSON credential store: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Token request failed: {0}")]
    TokenRequest(String),
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A cached access token and the instant it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl BearerToken {
    /// True once `now` is past the expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Typed contents of the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer: Option<BearerToken>,
    /// Every other key, e.g. `group_id_dev`, `report_id_pdf_dev`.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl Credentials {
    /// Look up any entry by its store key.
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            KEY_TENANT_ID => Some(&self.tenant_id),
            KEY_CLIENT_ID => Some(&self.client_id),
            KEY_CLIENT_SECRET => Some(&self.client_secret),
            KEY_BEARER => self.bearer.as_ref().map(|b| b.token.as_str()),
            other => self.extra.get(other).map(String::as_str),
        }
    }

    /// Like [`get`](Self::get) but fails with [`CredentialError::MissingKey`].
    pub fn require(&self, key: &str) -> Result<&str, CredentialError> {
        self.get(key)
            .ok_or_else(|| CredentialError::MissingKey(key.to_string()))
    }

    /// The cached token, if present.
    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer.as_ref().map(|b| b.token.as_str())
    }

    /// Whether the cached token is absent or expired at `now`.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        match &self.bearer {
            Some(bearer) => bearer.is_expired_at(now),
            None => true,
        }
    }

    /// All entries as `(key, value)` pairs in a stable order.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut entries = vec![
            (KEY_TENANT_ID.to_string(), self.tenant_id.clone()),
            (KEY_CLIENT_ID.to_string(), self.client_id.clone()),
            (KEY_CLIENT_SECRET.to_string(), self.client_secret.clone()),
        ];
        entries.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(bearer) = &self.bearer {
            entries.push((KEY_BEARER.to_string(), bearer.token.clone()));
        }
        entries
    }
}

// ---------------------------------------------------------------------------
// Token provider seam
// ---------------------------------------------------------------------------

/// Issues new access tokens via the OAuth2 client-credentials grant.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String, CredentialError>;
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle to the credential store file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    format: StoreFormat,
}

impl CredentialStore {
    /// Open the store at `path`, picking the format from the extension.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = StoreFormat::for_path(&path);
        Self { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the store without any expiry check.
    pub async fn read(&self) -> Result<Credentials, CredentialError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| CredentialError::Io {
                path: self.path.clone(),
                source,
            })?;
        self.format.parse(&content)
    }

    /// Replace the whole store with `credentials`.
    ///
    /// Writes to a temporary file in the same directory and renames it
    /// over the original, so readers never see a partial file.
    pub async fn write(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        let content = self.format.render(credentials)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || replace_file(&path, content.as_bytes()))
            .await
            .map_err(std::io::Error::other)
            .and_then(|written| written)
            .map_err(|source| CredentialError::Io {
                path: self.path.clone(),
                source,
            })
    }

    /// Load the credentials.
    ///
    /// Unless `skip_expiry_check` is set, an absent or expired bearer
    /// token is refreshed through `provider` before returning.
    pub async fn load(
        &self,
        skip_expiry_check: bool,
        provider: &dyn TokenProvider,
    ) -> Result<Credentials, CredentialError> {
        let credentials = self.read().await?;

        if skip_expiry_check || !credentials.needs_refresh_at(Utc::now()) {
            return Ok(credentials);
        }

        tracing::info!(path = %self.path.display(), "Bearer token expired, refreshing");
        self.refresh(
            provider,
            &credentials.tenant_id,
            &credentials.client_id,
            &credentials.client_secret,
        )
        .await
    }

    /// Request a new token, persist it with a one-hour expiry and return
    /// the reloaded credentials.
    pub async fn refresh(
        &self,
        provider: &dyn TokenProvider,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Credentials, CredentialError> {
        let token = provider
            .fetch_token(tenant_id, client_id, client_secret)
            .await?;
        let expires_at = Utc::now() + chrono::Duration::hours(TOKEN_LIFETIME_HOURS);

        let mut credentials = self.read().await?;
        credentials.bearer = Some(BearerToken { token, expires_at });
        self.write(&credentials).await?;

        tracing::info!(expires_at = %expires_at, "Bearer token refreshed");

        self.read().await
    }
}

/// Write `bytes` to a temp file next to `path` and rename it into place.
fn replace_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
