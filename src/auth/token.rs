use std::collections::BTreeSet;
use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scope::parse_scopes;

/// Durable credential produced by the device grant or a refresh.
///
/// Secrets are redacted from the `Debug` output.
///
/// # Example
/// ```
/// use devicegrant::auth::TokenRecord;
/// use chrono::{Duration, Utc};
///
/// let record = TokenRecord {
///     access_token: "secret-access".to_string(),
///     refresh_token: Some("secret-refresh".to_string()),
///     expires_at: Utc::now() + Duration::hours(1),
///     tenant: "acme.example.com".to_string(),
///     granted_scopes: ["read:users".to_string()].into_iter().collect(),
/// };
/// assert!(!format!("{record:?}").contains("secret-"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub tenant: String,
    pub granted_scopes: BTreeSet<String>,
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("tenant", &self.tenant)
            .field("granted_scopes", &self.granted_scopes)
            .finish()
    }
}

impl TokenRecord {
    /// Build a record at issuance time. `expires_at` is `issued_at + expires_in`.
    pub fn issue(
        access_token: String,
        refresh_token: Option<String>,
        expires_in_secs: u64,
        issued_at: DateTime<Utc>,
        tenant: String,
        granted_scopes: BTreeSet<String>,
    ) -> Self {
        let lifetime = i64::try_from(expires_in_secs).unwrap_or(i64::MAX);
        let expires_at = chrono::Duration::try_seconds(lifetime)
            .and_then(|delta| issued_at.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            access_token,
            refresh_token,
            expires_at,
            tenant,
            granted_scopes,
        }
    }

    /// True when `now + buffer` has reached the expiry (equality counts).
    pub fn is_expired_at(&self, now: DateTime<Utc>, buffer: chrono::Duration) -> bool {
        match now.checked_add_signed(buffer) {
            Some(deadline) => deadline >= self.expires_at,
            None => true,
        }
    }
}

/// Scopes granted by a token response, falling back to what was requested
/// when the server omits the `scope` field.
pub fn granted_scopes(scope: Option<&str>, fallback: &BTreeSet<String>) -> BTreeSet<String> {
    match scope {
        Some(raw) => parse_scopes(raw),
        None => fallback.clone(),
    }
}

/// Tenant for an access token: the host of its audience claim, else the
/// host of the configured audience.
pub fn resolve_tenant(access_token: &str, configured_audience: &str) -> String {
    tenant_from_access_token(access_token)
        .or_else(|| tenant_from_audience(configured_audience))
        .unwrap_or_else(|| configured_audience.to_string())
}

/// Read the `aud` claim of a JWT access token without verifying it.
pub fn tenant_from_access_token(access_token: &str) -> Option<String> {
    let payload = access_token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: AudienceClaims = serde_json::from_slice(&decoded).ok()?;
    let audiences = match claims.aud? {
        Audience::One(value) => vec![value],
        Audience::Many(values) => values,
    };
    audiences
        .iter()
        .find_map(|aud| tenant_from_audience(aud).filter(|_| aud.contains("://")))
        .or_else(|| audiences.iter().find_map(|aud| tenant_from_audience(aud)))
}

/// `https://acme.example.com/api/v2/` -> `acme.example.com`; bare values pass through.
pub fn tenant_from_audience(audience: &str) -> Option<String> {
    let trimmed = audience.trim();
    if trimmed.is_empty() {
        return None;
    }
    match url::Url::parse(trimmed) {
        Ok(parsed) if parsed.has_host() => parsed.host_str().map(str::to_string),
        _ => Some(trimmed.trim_end_matches('/').to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct AudienceClaims {
    aud: Option<Audience>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}
