//! Expiry checks and refresh-token exchange for the stored credential.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::server::AuthorizationServer;
use super::store::{CredentialKey, SecureCredentialStore};
use super::token::{granted_scopes, resolve_tenant, TokenRecord};
use crate::util::clock::{to_chrono, Clock, SystemClock};

/// Tokens this close to expiry are treated as expired.
pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::from_secs(300);

/// Decides on every access whether the stored credential is usable, needs a
/// refresh, or is gone.
///
/// Nothing here returns an error: an unusable credential is `None`/`true`.
/// Refreshes within one process are serialized; a caller that waited on an
/// in-flight refresh reuses its result instead of spending the refresh token
/// a second time.
pub struct TokenLifecycleManager {
    server: Arc<AuthorizationServer>,
    store: Arc<SecureCredentialStore>,
    clock: Arc<dyn Clock>,
    buffer: Duration,
    cached: Mutex<Option<TokenRecord>>,
    refresh_guard: tokio::sync::Mutex<()>,
}

impl TokenLifecycleManager {
    pub fn new(server: Arc<AuthorizationServer>, store: Arc<SecureCredentialStore>) -> Self {
        Self {
            server,
            store,
            clock: Arc::new(SystemClock),
            buffer: DEFAULT_EXPIRY_BUFFER,
            cached: Mutex::new(None),
            refresh_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Buffer used by [`get_valid_token`](Self::get_valid_token).
    pub fn with_buffer(mut self, buffer: Duration) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn buffer(&self) -> Duration {
        self.buffer
    }

    /// True if no record exists or `now + buffer >= expires_at`.
    pub fn is_expired(&self, buffer: Duration) -> bool {
        match self.current() {
            Some(record) => record.is_expired_at(self.clock.now(), to_chrono(buffer)),
            None => true,
        }
    }

    /// The in-process credential, loaded from the store on first use.
    pub fn current(&self) -> Option<TokenRecord> {
        if let Some(record) = self.cached_record() {
            return Some(record);
        }
        let record = self.store.load_record()?;
        self.remember(record.clone());
        Some(record)
    }

    /// Scopes recorded at issuance or the last refresh; empty without a record.
    pub fn granted_scopes(&self) -> BTreeSet<String> {
        self.current()
            .map(|record| record.granted_scopes)
            .unwrap_or_default()
    }

    /// Drop the in-process copy so the next access re-reads the store.
    pub fn invalidate(&self) {
        match self.cached.lock() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Returns `None` without touching the store when there is no refresh
    /// token, the server answers with an error payload, or the request fails.
    pub async fn refresh(&self) -> Option<TokenRecord> {
        let observed = self.current();
        let _guard = self.refresh_guard.lock().await;

        let latest = self.current();
        if let (Some(seen), Some(latest)) = (&observed, &latest) {
            if latest.access_token != seen.access_token
                && !latest.is_expired_at(self.clock.now(), to_chrono(self.buffer))
            {
                debug!("credential refreshed by a concurrent caller; reusing it");
                return Some(latest.clone());
            }
        }

        // An unpersisted rotation lives only in the cached record.
        let refresh_token = match &latest {
            Some(record) => record.refresh_token.clone(),
            None => self.store.get(CredentialKey::RefreshToken),
        };
        let Some(refresh_token) = refresh_token else {
            debug!("no refresh token stored; refresh skipped");
            return None;
        };

        let payload = match self.server.exchange_refresh_token(&refresh_token).await {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "token refresh request failed; stored credential kept");
                return None;
            }
        };
        if let Some(code) = payload.error {
            warn!(
                code = %code,
                description = payload.error_description.as_deref().unwrap_or(""),
                "token refresh rejected; stored credential kept"
            );
            return None;
        }
        let (Some(access_token), Some(expires_in)) = (payload.access_token, payload.expires_in)
        else {
            warn!(
                "token refresh response missing access_token or expires_in; stored credential kept"
            );
            return None;
        };

        let previous_scopes = latest
            .map(|record| record.granted_scopes)
            .unwrap_or_default();
        let rotated = payload.refresh_token.is_some();
        let record = TokenRecord::issue(
            access_token.clone(),
            payload.refresh_token.or(Some(refresh_token)),
            expires_in,
            self.clock.now(),
            resolve_tenant(&access_token, self.server.audience()),
            granted_scopes(payload.scope.as_deref(), &previous_scopes),
        );
        if !self.store.save_record(&record) {
            warn!("refreshed credential could not be persisted; using it for this process only");
        }
        self.remember(record.clone());
        info!(
            tenant = %record.tenant,
            expires_at = %record.expires_at,
            rotated,
            "access token refreshed"
        );
        Some(record)
    }

    /// A usable access token, refreshing first when it is within the buffer.
    ///
    /// When the refresh fails the stored token is returned even if expired;
    /// `None` means no credential exists and setup must be re-run.
    pub async fn get_valid_token(&self) -> Option<String> {
        let record = self.current()?;
        if !record.is_expired_at(self.clock.now(), to_chrono(self.buffer)) {
            return Some(record.access_token);
        }
        match self.refresh().await {
            Some(refreshed) => Some(refreshed.access_token),
            None => {
                warn!(
                    expires_at = %record.expires_at,
                    "refresh failed; falling back to the stored access token"
                );
                Some(record.access_token)
            }
        }
    }

    fn cached_record(&self) -> Option<TokenRecord> {
        match self.cached.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn remember(&self, record: TokenRecord) {
        match self.cached.lock() {
            Ok(mut guard) => *guard = Some(record),
            Err(poisoned) => *poisoned.into_inner() = Some(record),
        }
    }
}
