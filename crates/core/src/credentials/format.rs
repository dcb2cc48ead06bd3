//! On-disk encodings of the credential store.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

use super::{
    BearerToken, CredentialError, Credentials, KEY_BEARER, KEY_CLIENT_ID, KEY_CLIENT_SECRET,
    KEY_TENANT_ID,
};

/// Parse format of the legacy bearer expiry (local time, optional fraction).
const LEGACY_EXPIRY_PARSE: &str = "%Y-%m-%d %H:%M:%S%.f";
/// Render format of the legacy bearer expiry (always six fractional digits).
const LEGACY_EXPIRY_RENDER: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Encoding of the credential store file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFormat {
    /// One `key,value` per line; the bearer line is
    /// `bearer,token,YYYY-MM-DD HH:MM:SS.ffffff` in local time.
    Lines,
    /// The serialized [`Credentials`] record, expiry in RFC 3339.
    Json,
}

impl StoreFormat {
    /// `.json` files use [`StoreFormat::Json`], everything else
    /// [`StoreFormat::Lines`].
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Lines,
        }
    }

    pub(super) fn parse(self, content: &str) -> Result<Credentials, CredentialError> {
        match self {
            Self::Lines => parse_lines(content),
            Self::Json => Ok(serde_json::from_str(content)?),
        }
    }

    pub(super) fn render(self, credentials: &Credentials) -> Result<String, CredentialError> {
        match self {
            Self::Lines => Ok(render_lines(credentials)),
            Self::Json => Ok(serde_json::to_string_pretty(credentials)?),
        }
    }
}

fn parse_lines(content: &str) -> Result<Credentials, CredentialError> {
    let mut entries: BTreeMap<String, String> = BTreeMap::new();
    let mut bearer: Option<BearerToken> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = raw.split(',').collect();
        if fields.len() < 2 {
            return Err(CredentialError::Malformed {
                line: line_no,
                reason: "expected 'key,value'".to_string(),
            });
        }
        let key = fields[0].trim();
        let value = fields[1].trim();
        if key.is_empty() {
            return Err(CredentialError::Malformed {
                line: line_no,
                reason: "empty key".to_string(),
            });
        }

        if key == KEY_BEARER {
            let expiry = fields.get(2).map(|s| s.trim()).ok_or_else(|| {
                CredentialError::Malformed {
                    line: line_no,
                    reason: "bearer entry has no expiry".to_string(),
                }
            })?;
            bearer = Some(BearerToken {
                token: value.to_string(),
                expires_at: parse_legacy_expiry(expiry, line_no)?,
            });
        } else {
            entries.insert(key.to_string(), value.to_string());
        }
    }

    let mut take = |key: &str| {
        entries
            .remove(key)
            .ok_or_else(|| CredentialError::MissingKey(key.to_string()))
    };
    let tenant_id = take(KEY_TENANT_ID)?;
    let client_id = take(KEY_CLIENT_ID)?;
    let client_secret = take(KEY_CLIENT_SECRET)?;

    Ok(Credentials {
        tenant_id,
        client_id,
        client_secret,
        bearer,
        extra: entries,
    })
}

fn render_lines(credentials: &Credentials) -> String {
    let mut out = String::new();
    for (key, value) in credentials.entries() {
        if key == KEY_BEARER {
            continue;
        }
        out.push_str(&format!("{key},{value}\n"));
    }
    if let Some(bearer) = &credentials.bearer {
        let expiry = bearer
            .expires_at
            .with_timezone(&Local)
            .format(LEGACY_EXPIRY_RENDER);
        out.push_str(&format!("{KEY_BEARER},{},{expiry}\n", bearer.token));
    }
    out
}

fn parse_legacy_expiry(value: &str, line: usize) -> Result<DateTime<Utc>, CredentialError> {
    let invalid = || CredentialError::InvalidExpiry {
        line,
        value: value.to_string(),
    };
    let naive = NaiveDateTime::parse_from_str(value, LEGACY_EXPIRY_PARSE).map_err(|_| invalid())?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(invalid)
}
