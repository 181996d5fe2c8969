use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use super::device_code::DeviceGrantInitiator;
use super::error::AuthError;
use super::events::{silent_sink, BrowserLauncher, EventSink, NoBrowser};
use super::gate::OperationGate;
use super::lifecycle::TokenLifecycleManager;
use super::poller::AuthorizationPoller;
use super::server::AuthorizationServer;
use super::store::SecureCredentialStore;
use super::token::TokenRecord;
use crate::config::GrantConfig;
use crate::util::clock::{to_chrono, Clock, Pause, SystemClock, TokioPause};

/// Snapshot of the stored credential, without secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStatus {
    pub tenant: String,
    pub expires_at: DateTime<Utc>,
    pub granted_scopes: BTreeSet<String>,
    pub has_refresh_token: bool,
    /// Past `expires_at`.
    pub expired: bool,
    /// Within the expiry buffer; the next access will refresh.
    pub refresh_due: bool,
}

/// Service facade wiring setup, lifecycle and gate to one configuration.
///
/// All I/O decisions (printing, prompting, exit codes) belong to the caller;
/// progress is reported through the [`EventSink`].
///
/// # Example
/// ```no_run
/// use devicegrant::auth::AuthService;
/// use devicegrant::config::GrantConfig;
///
/// # async fn run() -> Result<(), devicegrant::auth::AuthError> {
/// let service = AuthService::new(GrantConfig::from_env()?)?;
/// if service.lifecycle().get_valid_token().await.is_none() {
///     service.login(&[]).await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct AuthService {
    config: GrantConfig,
    server: Arc<AuthorizationServer>,
    store: Arc<SecureCredentialStore>,
    lifecycle: Arc<TokenLifecycleManager>,
    clock: Arc<dyn Clock>,
    pause: Arc<dyn Pause>,
    browser: Arc<dyn BrowserLauncher>,
    events: EventSink,
}

impl AuthService {
    /// Build the HTTP client and the configured credential store.
    pub fn new(config: GrantConfig) -> Result<Self, AuthError> {
        let server = AuthorizationServer::new(&config)?;
        let store = config.build_store();
        Ok(Self::from_parts(config, server, store))
    }

    /// Assemble from an explicit server and store (tests, custom backends).
    pub fn from_parts(
        config: GrantConfig,
        server: AuthorizationServer,
        store: SecureCredentialStore,
    ) -> Self {
        let server = Arc::new(server);
        let store = Arc::new(store);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let lifecycle = build_lifecycle(&config, &server, &store, &clock);
        Self {
            config,
            server,
            store,
            lifecycle,
            clock,
            pause: Arc::new(TokioPause),
            browser: Arc::new(NoBrowser),
            events: silent_sink(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.lifecycle = build_lifecycle(&self.config, &self.server, &self.store, &clock);
        self.clock = clock;
        self
    }

    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
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

    pub fn config(&self) -> &GrantConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SecureCredentialStore> {
        &self.store
    }

    pub fn lifecycle(&self) -> Arc<TokenLifecycleManager> {
        self.lifecycle.clone()
    }

    pub fn gate(&self) -> OperationGate {
        OperationGate::new(self.lifecycle.clone())
    }

    pub fn initiator(&self) -> DeviceGrantInitiator {
        DeviceGrantInitiator::new(self.server.clone())
            .with_clock(self.clock.clone())
            .with_browser(self.browser.clone())
            .with_events(self.events.clone())
    }

    pub fn poller(&self) -> AuthorizationPoller {
        AuthorizationPoller::new(self.server.clone(), self.store.clone())
            .with_clock(self.clock.clone())
            .with_pause(self.pause.clone())
            .with_events(self.events.clone())
            .with_transport_retries(self.config.poll_transport_retries)
    }

    /// Interactive setup: initiate, poll to completion, persist.
    ///
    /// An empty `scopes` requests the configured scopes.
    pub async fn login(&self, scopes: &[String]) -> Result<TokenRecord, AuthError> {
        let requested = self.config.requested_scopes(scopes);
        let session = self.initiator().initiate(&requested).await?;
        let record = self.poller().poll(session).await?;
        self.lifecycle.invalidate();
        info!(service = %self.store.service(), tenant = %record.tenant, "login complete");
        Ok(record)
    }

    /// `None` when no complete credential is stored.
    pub fn status(&self) -> Option<CredentialStatus> {
        let record = self.lifecycle.current()?;
        let now = self.clock.now();
        Some(CredentialStatus {
            expired: record.is_expired_at(now, to_chrono(Duration::ZERO)),
            refresh_due: record.is_expired_at(now, to_chrono(self.lifecycle.buffer())),
            has_refresh_token: record.refresh_token.is_some(),
            tenant: record.tenant,
            expires_at: record.expires_at,
            granted_scopes: record.granted_scopes,
        })
    }

    /// Delete every stored entry. Succeeds when already logged out.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.lifecycle.invalidate();
        if self.store.clear() {
            info!(service = %self.store.service(), "credentials removed");
            Ok(())
        } else {
            Err(AuthError::Storage(format!(
                "could not remove every credential entry for '{}'",
                self.store.service()
            )))
        }
    }
}

fn build_lifecycle(
    config: &GrantConfig,
    server: &Arc<AuthorizationServer>,
    store: &Arc<SecureCredentialStore>,
    clock: &Arc<dyn Clock>,
) -> Arc<TokenLifecycleManager> {
    Arc::new(
        TokenLifecycleManager::new(server.clone(), store.clone())
            .with_clock(clock.clone())
            .with_buffer(config.expiry_buffer),
    )
}
