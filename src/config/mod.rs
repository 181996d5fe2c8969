//! Grant configuration (code > env > `.env`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::auth::error::AuthError;
use crate::auth::lifecycle::DEFAULT_EXPIRY_BUFFER;
use crate::auth::scope::{parse_scopes, Scope, OFFLINE_ACCESS};
use crate::auth::store::{
    default_store_dir, FileBackend, KeyringBackend, MemoryBackend, SecretBackend,
    SecureCredentialStore,
};

/// Keychain service name all credential entries are stored under.
pub const DEFAULT_SERVICE: &str = "devicegrant";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_DOMAIN: &str = "DEVICEGRANT_DOMAIN";
pub const ENV_CLIENT_ID: &str = "DEVICEGRANT_CLIENT_ID";
pub const ENV_AUDIENCE: &str = "DEVICEGRANT_AUDIENCE";
pub const ENV_SCOPES: &str = "DEVICEGRANT_SCOPES";
pub const ENV_SERVICE: &str = "DEVICEGRANT_SERVICE";
pub const ENV_EXPIRY_BUFFER_SECS: &str = "DEVICEGRANT_EXPIRY_BUFFER_SECS";
pub const ENV_STORE: &str = "DEVICEGRANT_STORE";
pub const ENV_STORE_DIR: &str = "DEVICEGRANT_STORE_DIR";

/// Every variable [`GrantConfig::from_env`] reads.
pub const ENV_VARS: [&str; 8] = [
    ENV_DOMAIN,
    ENV_CLIENT_ID,
    ENV_AUDIENCE,
    ENV_SCOPES,
    ENV_SERVICE,
    ENV_EXPIRY_BUFFER_SECS,
    ENV_STORE,
    ENV_STORE_DIR,
];

/// Where secrets are kept.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StoreKind {
    /// OS keychain via `keyring`.
    #[default]
    Keyring,
    /// TOML file under the store directory.
    File,
    /// Process memory only.
    Memory,
}

/// Settings for the device grant and the credential lifecycle.
///
/// # Example
/// ```
/// use devicegrant::config::GrantConfig;
///
/// let config = GrantConfig::builder()
///     .domain("acme.example.com/")
///     .client_id("cli-client")
///     .scopes(vec!["read:users".to_string()])
///     .build();
/// assert_eq!(config.token_url(), "https://acme.example.com/oauth/token");
/// assert_eq!(config.resolved_audience(), "https://acme.example.com/api/v2/");
/// ```
#[derive(Debug, Clone, Builder)]
pub struct GrantConfig {
    /// Authorization server domain, with or without scheme.
    #[builder(into)]
    pub domain: String,
    #[builder(into)]
    pub client_id: String,
    /// API audience; defaults to the management API of `domain`.
    #[builder(into)]
    pub audience: Option<String>,
    /// Scopes requested at login.
    #[builder(default)]
    pub scopes: Vec<String>,
    /// Append `offline_access` so the server issues a refresh token.
    #[builder(default = true)]
    pub request_offline_access: bool,
    #[builder(into, default = DEFAULT_SERVICE.to_string())]
    pub service_name: String,
    #[builder(default = DEFAULT_EXPIRY_BUFFER)]
    pub expiry_buffer: Duration,
    #[builder(default)]
    pub store: StoreKind,
    /// File backend directory; defaults to `~/.devicegrant`.
    #[builder(into)]
    pub store_dir: Option<PathBuf>,
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    pub request_timeout: Duration,
    /// Consecutive transport failures tolerated while polling.
    #[builder(default)]
    pub poll_transport_retries: u32,
}

impl GrantConfig {
    /// Load from the process environment, after reading `.env` if present.
    pub fn from_env() -> Result<Self, AuthError> {
        let _ = dotenvy::dotenv(); // a missing .env is fine
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let domain = var(ENV_DOMAIN)
            .ok_or_else(|| AuthError::Configuration(format!("{ENV_DOMAIN} is not set")))?;
        let client_id = var(ENV_CLIENT_ID)
            .ok_or_else(|| AuthError::Configuration(format!("{ENV_CLIENT_ID} is not set")))?;

        let expiry_buffer = match var(ENV_EXPIRY_BUFFER_SECS) {
            Some(raw) => Duration::from_secs(raw.parse().map_err(|_| {
                AuthError::Configuration(format!(
                    "{ENV_EXPIRY_BUFFER_SECS} must be a whole number of seconds, got '{raw}'"
                ))
            })?),
            None => DEFAULT_EXPIRY_BUFFER,
        };
        let store = match var(ENV_STORE) {
            Some(raw) => raw.parse::<StoreKind>().map_err(|_| {
                AuthError::Configuration(format!(
                    "{ENV_STORE} must be one of keyring, file, memory; got '{raw}'"
                ))
            })?,
            None => StoreKind::default(),
        };

        let scopes: Vec<String> = var(ENV_SCOPES)
            .map(|raw| parse_scopes(&raw).into_iter().collect())
            .unwrap_or_default();
        for scope in &scopes {
            Scope::parse(scope)?;
        }

        Ok(Self::builder()
            .domain(domain)
            .client_id(client_id)
            .maybe_audience(var(ENV_AUDIENCE))
            .scopes(scopes)
            .service_name(var(ENV_SERVICE).unwrap_or_else(|| DEFAULT_SERVICE.to_string()))
            .expiry_buffer(expiry_buffer)
            .store(store)
            .maybe_store_dir(var(ENV_STORE_DIR).map(PathBuf::from))
            .build())
    }

    /// `https://{domain}` with any trailing slash removed.
    pub fn base_url(&self) -> String {
        let domain = self.domain.trim().trim_end_matches('/');
        if domain.starts_with("https://") || domain.starts_with("http://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        }
    }

    pub fn device_code_url(&self) -> String {
        format!("{}/oauth/device/code", self.base_url())
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.base_url())
    }

    pub fn resolved_audience(&self) -> String {
        match self.audience.as_deref().map(str::trim) {
            Some(audience) if !audience.is_empty() => audience.to_string(),
            _ => format!("{}/api/v2/", self.base_url()),
        }
    }

    /// Scopes for a login: `overrides` if given, else the configured scopes,
    /// deduplicated in order, with `offline_access` appended when enabled.
    pub fn requested_scopes(&self, overrides: &[String]) -> Vec<String> {
        let source = if overrides.is_empty() {
            self.scopes.as_slice()
        } else {
            overrides
        };
        let mut scopes: Vec<String> = Vec::with_capacity(source.len() + 1);
        for scope in source {
            let scope = scope.trim();
            if !scope.is_empty() && !scopes.iter().any(|s| s == scope) {
                scopes.push(scope.to_string());
            }
        }
        if self.request_offline_access && !scopes.iter().any(|s| s == OFFLINE_ACCESS) {
            scopes.push(OFFLINE_ACCESS.to_string());
        }
        scopes
    }

    /// Credential store for the configured backend and service name.
    pub fn build_store(&self) -> SecureCredentialStore {
        let backend: Arc<dyn SecretBackend> = match self.store {
            StoreKind::Keyring => Arc::new(KeyringBackend),
            StoreKind::File => Arc::new(FileBackend::new(
                self.store_dir.clone().unwrap_or_else(default_store_dir),
            )),
            StoreKind::Memory => Arc::new(MemoryBackend::new()),
        };
        SecureCredentialStore::new(backend, self.service_name.clone())
    }
}
