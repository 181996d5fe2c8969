use std::sync::Arc;

use chrono::{DateTime, Utc};
use strum::Display;
use tracing::{debug, warn};
use url::Url;

use super::error::AuthError;
use super::events::{silent_sink, BrowserLauncher, EventSink, GrantEvent, NoBrowser};
use super::server::AuthorizationServer;
use super::token::TokenRecord;
use crate::util::clock::{to_chrono, Clock, SystemClock};

/// Poll interval used when the server does not advise one (RFC 8628 §3.2).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// In-memory device authorization session; never persisted.
///
/// # Example
/// ```
/// use devicegrant::auth::DeviceGrantSession;
/// use chrono::{Duration, Utc};
///
/// let session = DeviceGrantSession {
///     device_code: "device-code".to_string(),
///     user_code: "ABCD-EFGH".to_string(),
///     verification_uri: "https://acme.example.com/activate".to_string(),
///     interval_secs: 5,
///     expires_in_secs: 900,
///     expires_at: Utc::now() + Duration::seconds(900),
///     requested_scopes: vec!["read:users".to_string()],
/// };
/// ```
#[derive(Debug, Clone)]
pub struct DeviceGrantSession {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub interval_secs: u64,
    pub expires_in_secs: u64,
    pub expires_at: DateTime<Utc>,
    pub requested_scopes: Vec<String>,
}

/// Outcome of a single poll attempt.
#[derive(Debug, Clone)]
pub enum DeviceCodePoll {
    Pending { interval_secs: u64 },
    SlowDown { interval_secs: u64 },
    Authorized { record: TokenRecord },
    AccessDenied,
    Expired,
}

/// Poller state machine. `Polling` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PollState {
    Polling,
    Succeeded,
    Denied,
    Expired,
    Failed,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Polling)
    }
}

/// Starts a device authorization session and points the operator at it.
pub struct DeviceGrantInitiator {
    server: Arc<AuthorizationServer>,
    clock: Arc<dyn Clock>,
    browser: Arc<dyn BrowserLauncher>,
    events: EventSink,
}

impl DeviceGrantInitiator {
    pub fn new(server: Arc<AuthorizationServer>) -> Self {
        Self {
            server,
            clock: Arc::new(SystemClock),
            browser: Arc::new(NoBrowser),
            events: silent_sink(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Request a device code, show it, and try to open the verification page.
    ///
    /// Server errors and malformed sessions abort setup; a failed browser
    /// launch does not.
    pub async fn initiate<S: AsRef<str>>(
        &self,
        requested_scopes: &[S],
    ) -> Result<DeviceGrantSession, AuthError> {
        let payload = self.server.request_device_code(requested_scopes).await?;
        if let Some(code) = payload.error {
            return Err(AuthError::server(code, payload.error_description));
        }

        let device_code = required(payload.device_code, "device_code")?;
        let user_code = required(payload.user_code, "user_code")?;
        let verification_uri = required(
            payload.verification_uri_complete.or(payload.verification_uri),
            "verification_uri",
        )?;
        let expires_in_secs = payload.expires_in.ok_or_else(|| {
            AuthError::InvalidResponse("device code response missing expires_in".to_string())
        })?;
        let url = validate_verification_uri(&verification_uri)?;

        let session = DeviceGrantSession {
            device_code,
            user_code,
            verification_uri,
            interval_secs: payload.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            expires_in_secs,
            expires_at: self
                .clock
                .now()
                .checked_add_signed(to_chrono(std::time::Duration::from_secs(expires_in_secs)))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            requested_scopes: requested_scopes
                .iter()
                .map(|s| s.as_ref().to_string())
                .collect(),
        };
        debug!(
            interval_secs = session.interval_secs,
            expires_in_secs = session.expires_in_secs,
            "device authorization session started"
        );

        (self.events)(&GrantEvent::VerificationRequired {
            user_code: session.user_code.clone(),
            verification_uri: session.verification_uri.clone(),
        });
        match self.browser.open(&url) {
            Ok(()) => (self.events)(&GrantEvent::BrowserOpened {
                verification_uri: session.verification_uri.clone(),
            }),
            Err(err) => {
                warn!(error = %err, "could not open browser for verification");
                (self.events)(&GrantEvent::BrowserUnavailable {
                    reason: err.to_string(),
                });
            }
        }
        Ok(session)
    }
}

/// Parse the URI and accept only `http`/`https`.
pub fn validate_verification_uri(raw: &str) -> Result<Url, AuthError> {
    let url = Url::parse(raw.trim()).map_err(|err| {
        AuthError::InvalidResponse(format!("verification URI '{raw}' is not a URL: {err}"))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AuthError::UnsafeVerificationUri {
            uri: raw.to_string(),
            scheme: other.to_string(),
        }),
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, AuthError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AuthError::InvalidResponse(format!(
            "device code response missing {field}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_and_http_uris_are_accepted() {
        assert!(validate_verification_uri("https://acme.example.com/activate").is_ok());
        assert!(validate_verification_uri("http://localhost:8080/activate").is_ok());
    }

    #[test]
    fn other_schemes_are_rejected() {
        for raw in [
            "file:///etc/passwd",
            "javascript:alert(1)",
            "smb://share/payload",
        ] {
            match validate_verification_uri(raw) {
                Err(AuthError::UnsafeVerificationUri { scheme, .. }) => {
                    assert!(!scheme.starts_with("http"));
                }
                other => panic!("expected UnsafeVerificationUri for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn unparseable_uri_is_invalid_response() {
        assert!(matches!(
            validate_verification_uri("not a url"),
            Err(AuthError::InvalidResponse(_))
        ));
    }

    #[test]
    fn only_polling_is_non_terminal() {
        assert!(!PollState::Polling.is_terminal());
        for state in [
            PollState::Succeeded,
            PollState::Denied,
            PollState::Expired,
            PollState::Failed,
        ] {
            assert!(state.is_terminal());
        }
        assert_eq!(PollState::Succeeded.to_string(), "succeeded");
    }
}
