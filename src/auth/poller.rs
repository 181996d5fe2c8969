//! Device-code polling until the session resolves.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::device_code::{DeviceCodePoll, DeviceGrantSession, PollState};
use super::error::AuthError;
use super::events::{silent_sink, EventSink, GrantEvent};
use super::server::AuthorizationServer;
use super::store::SecureCredentialStore;
use super::token::{granted_scopes, resolve_tenant, TokenRecord};
use crate::util::clock::{Clock, Pause, SystemClock, TokioPause};

/// Seconds added to the interval on every `slow_down` (RFC 8628 §3.5).
pub const SLOW_DOWN_STEP_SECS: u64 = 5;

/// Polls the token endpoint for a device-grant session.
///
/// Attempts run strictly one after another with a suspension in between.
/// The session deadline is checked locally before every attempt, so the loop
/// ends in `Expired` even if the server never says so.
pub struct AuthorizationPoller {
    server: Arc<AuthorizationServer>,
    store: Arc<SecureCredentialStore>,
    clock: Arc<dyn Clock>,
    pause: Arc<dyn Pause>,
    events: EventSink,
    transport_retries: u32,
}

impl AuthorizationPoller {
    pub fn new(server: Arc<AuthorizationServer>, store: Arc<SecureCredentialStore>) -> Self {
        Self {
            server,
            store,
            clock: Arc::new(SystemClock),
            pause: Arc::new(TokioPause),
            events: silent_sink(),
            transport_retries: 0,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Consecutive transport failures tolerated before the poll fails.
    pub fn with_transport_retries(mut self, retries: u32) -> Self {
        self.transport_retries = retries;
        self
    }

    /// Poll until `Succeeded` (record persisted and returned) or a terminal error.
    ///
    /// `Denied` maps to [`AuthError::AccessDenied`], `Expired` to
    /// [`AuthError::ExpiredToken`]; everything else is `Failed`.
    pub async fn poll(&self, session: DeviceGrantSession) -> Result<TokenRecord, AuthError> {
        let mut interval_secs = session.interval_secs;
        let mut attempt: u32 = 0;
        let mut transport_failures: u32 = 0;

        loop {
            attempt += 1;
            match self.poll_once(&session, interval_secs).await {
                Ok(DeviceCodePoll::Authorized { record }) => {
                    self.finish(PollState::Succeeded);
                    return Ok(record);
                }
                Ok(DeviceCodePoll::AccessDenied) => {
                    self.finish(PollState::Denied);
                    return Err(AuthError::AccessDenied);
                }
                Ok(DeviceCodePoll::Expired) => {
                    self.finish(PollState::Expired);
                    return Err(AuthError::ExpiredToken);
                }
                Ok(DeviceCodePoll::Pending { .. }) => {
                    transport_failures = 0;
                }
                Ok(DeviceCodePoll::SlowDown {
                    interval_secs: slower,
                }) => {
                    transport_failures = 0;
                    interval_secs = slower;
                    (self.events)(&GrantEvent::SlowDown {
                        interval: Duration::from_secs(interval_secs),
                    });
                }
                Err(err) if err.is_retryable() && transport_failures < self.transport_retries => {
                    transport_failures += 1;
                    warn!(
                        attempt,
                        transport_failures,
                        error = %err,
                        "token poll failed; retrying within session"
                    );
                }
                Err(err) => {
                    self.finish(err.poll_state());
                    return Err(err);
                }
            }

            let interval = Duration::from_secs(interval_secs);
            (self.events)(&GrantEvent::Waiting { attempt, interval });
            self.pause.pause(interval).await;
        }
    }

    /// One token-endpoint attempt. Persists the record on success.
    pub async fn poll_once(
        &self,
        session: &DeviceGrantSession,
        interval_secs: u64,
    ) -> Result<DeviceCodePoll, AuthError> {
        if self.clock.now() >= session.expires_at {
            debug!("device code session deadline passed");
            return Ok(DeviceCodePoll::Expired);
        }

        let payload = self
            .server
            .exchange_device_code(&session.device_code)
            .await?;

        if let Some(access_token) = payload.access_token {
            let expires_in = payload.expires_in.ok_or_else(|| {
                AuthError::InvalidResponse("token response missing expires_in".to_string())
            })?;
            let requested = session.requested_scopes.iter().cloned().collect();
            let record = TokenRecord::issue(
                access_token.clone(),
                payload.refresh_token,
                expires_in,
                self.clock.now(),
                resolve_tenant(&access_token, self.server.audience()),
                granted_scopes(payload.scope.as_deref(), &requested),
            );
            if !self.store.save_record(&record) {
                return Err(AuthError::Storage(
                    "could not persist the issued credential".to_string(),
                ));
            }
            info!(
                tenant = %record.tenant,
                expires_at = %record.expires_at,
                has_refresh_token = record.refresh_token.is_some(),
                "device authorization succeeded"
            );
            return Ok(DeviceCodePoll::Authorized { record });
        }

        match payload.error.as_deref() {
            Some("authorization_pending") => Ok(DeviceCodePoll::Pending { interval_secs }),
            Some("slow_down") => Ok(DeviceCodePoll::SlowDown {
                interval_secs: interval_secs
                    .saturating_add(SLOW_DOWN_STEP_SECS)
                    .max(payload.interval.unwrap_or(0)),
            }),
            Some("expired_token") => Ok(DeviceCodePoll::Expired),
            Some("access_denied") => Ok(DeviceCodePoll::AccessDenied),
            Some(other) => Err(AuthError::server(other, payload.error_description)),
            None => Err(AuthError::InvalidResponse(
                "token response missing access_token and error".to_string(),
            )),
        }
    }

    fn finish(&self, state: PollState) {
        debug!(%state, "device code polling finished");
        (self.events)(&GrantEvent::Finished { state });
    }
}
