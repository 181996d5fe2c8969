//! HTTP exchanges with the authorization server.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::error::AuthError;
use super::scope::join_scopes;
use crate::config::GrantConfig;

pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
pub const REFRESH_TOKEN_GRANT_TYPE: &str = "refresh_token";

/// Client for the device-code and token endpoints.
///
/// Error payloads are returned as data (`error` field set) whatever the HTTP
/// status; only transport failures and unparseable bodies become errors.
///
/// # Example
/// ```no_run
/// use devicegrant::auth::AuthorizationServer;
/// use devicegrant::config::GrantConfig;
///
/// let config = GrantConfig::builder()
///     .domain("acme.example.com")
///     .client_id("cli-client")
///     .build();
/// let server = AuthorizationServer::new(&config)?
///     .with_token_url("http://127.0.0.1:8080/oauth/token");
/// # Ok::<(), devicegrant::auth::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct AuthorizationServer {
    client: reqwest::Client,
    client_id: String,
    audience: String,
    device_code_url: String,
    token_url: String,
}

impl AuthorizationServer {
    pub fn new(config: &GrantConfig) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            client_id: config.client_id.clone(),
            audience: config.resolved_audience(),
            device_code_url: config.device_code_url(),
            token_url: config.token_url(),
        })
    }

    pub fn with_device_code_url(mut self, url: impl Into<String>) -> Self {
        self.device_code_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// `POST /oauth/device/code` with client id, audience and scopes.
    pub async fn request_device_code<S: AsRef<str>>(
        &self,
        scopes: &[S],
    ) -> Result<DeviceCodeResponse, AuthError> {
        let scope = join_scopes(scopes);
        debug!(url = %self.device_code_url, scope = %scope, "requesting device code");
        let resp = self
            .client
            .post(&self.device_code_url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("audience", self.audience.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await?;
        decode_payload(resp, "device code").await
    }

    /// Device-code grant poll against the token endpoint.
    pub async fn exchange_device_code(
        &self,
        device_code: &str,
    ) -> Result<TokenResponse, AuthError> {
        debug!(url = %self.token_url, "polling token endpoint");
        let resp = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", DEVICE_CODE_GRANT_TYPE),
                ("client_id", self.client_id.as_str()),
                ("device_code", device_code),
            ])
            .send()
            .await?;
        decode_payload(resp, "device token").await
    }

    /// Refresh-token grant against the token endpoint.
    pub async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, AuthError> {
        debug!(url = %self.token_url, "exchanging refresh token");
        let resp = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", REFRESH_TOKEN_GRANT_TYPE),
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        decode_payload(resp, "refresh token").await
    }
}

async fn decode_payload<T: DeserializeOwned>(
    resp: reqwest::Response,
    what: &str,
) -> Result<T, AuthError> {
    let status = resp.status();
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|err| {
        AuthError::InvalidResponse(format!(
            "{what} response (status {status}) is not valid JSON: {err}"
        ))
    })
}

/// Device authorization response (RFC 8628 §3.2) or an error payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: Option<String>,
    pub user_code: Option<String>,
    pub verification_uri: Option<String>,
    pub verification_uri_complete: Option<String>,
    pub interval: Option<u64>,
    pub expires_in: Option<u64>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Token endpoint response or an error payload.
#[derive(Clone, Default, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
    pub interval: Option<u64>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .field("interval", &self.interval)
            .field("error", &self.error)
            .field("error_description", &self.error_description)
            .finish()
    }
}
