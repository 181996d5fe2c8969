#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use devicegrant::auth::{
    AuthError, AuthorizationServer, BrowserLauncher, DeviceGrantSession, EventSink, GrantEvent,
    MemoryBackend, SecretBackend, SecureCredentialStore, TokenRecord,
};
use devicegrant::config::GrantConfig;
use devicegrant::util::{ManualClock, Pause};
use serde_json::json;
use url::Url;
use wiremock::MockServer;

pub const DEVICE_CODE_PATH: &str = "/oauth/device/code";
pub const TOKEN_PATH: &str = "/oauth/token";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn grant_config() -> GrantConfig {
    GrantConfig::builder()
        .domain("acme.example.com")
        .client_id("cli-client")
        .scopes(vec!["read:users".to_string()])
        .build()
}

pub fn server_for(mock: &MockServer) -> AuthorizationServer {
    AuthorizationServer::new(&grant_config())
        .expect("client")
        .with_device_code_url(format!("{}{DEVICE_CODE_PATH}", mock.uri()))
        .with_token_url(format!("{}{TOKEN_PATH}", mock.uri()))
}

/// Unsigned JWT whose `aud` claim is `audience`.
pub fn jwt_with_audience(audience: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(
        json!({ "aud": [audience, "https://acme.example.com/userinfo"], "sub": "device|1" })
            .to_string(),
    );
    format!("{header}.{claims}.signature")
}

pub fn session(
    clock: &ManualClock,
    interval_secs: u64,
    expires_in_secs: u64,
) -> DeviceGrantSession {
    use devicegrant::util::Clock;
    DeviceGrantSession {
        device_code: "dev-1".to_string(),
        user_code: "ABCD-EFGH".to_string(),
        verification_uri: "https://acme.example.com/activate".to_string(),
        interval_secs,
        expires_in_secs,
        expires_at: clock.now() + chrono::Duration::seconds(expires_in_secs as i64),
        requested_scopes: vec!["read:users".to_string(), "offline_access".to_string()],
    }
}

pub fn record(
    access_token: &str,
    refresh_token: Option<&str>,
    expires_at: DateTime<Utc>,
    scopes: &[&str],
) -> TokenRecord {
    TokenRecord {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expires_at,
        tenant: "acme.example.com".to_string(),
        granted_scopes: scopes.iter().map(|s| s.to_string()).collect(),
    }
}

/// Pause that records each wait and moves a manual clock instead of sleeping.
#[derive(Default)]
pub struct RecordingPause {
    clock: Option<Arc<ManualClock>>,
    waits: Mutex<Vec<Duration>>,
}

impl RecordingPause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advancing(clock: Arc<ManualClock>) -> Self {
        Self {
            clock: Some(clock),
            waits: Mutex::new(Vec::new()),
        }
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().expect("waits lock poisoned").clone()
    }
}

#[async_trait]
impl Pause for RecordingPause {
    async fn pause(&self, duration: Duration) {
        self.waits
            .lock()
            .expect("waits lock poisoned")
            .push(duration);
        if let Some(clock) = &self.clock {
            clock.advance(duration);
        }
    }
}

/// Browser double that records launches.
#[derive(Default)]
pub struct RecordingBrowser {
    fail: bool,
    opened: Mutex<Vec<String>>,
}

impl RecordingBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().expect("browser lock poisoned").clone()
    }
}

impl BrowserLauncher for RecordingBrowser {
    fn open(&self, url: &Url) -> std::io::Result<()> {
        self.opened
            .lock()
            .expect("browser lock poisoned")
            .push(url.to_string());
        if self.fail {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no display",
            ))
        } else {
            Ok(())
        }
    }
}

/// Event sink that keeps every event for assertions.
pub fn event_log() -> (EventSink, Arc<Mutex<Vec<GrantEvent>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink_log = log.clone();
    let sink: EventSink = Arc::new(move |event: &GrantEvent| {
        sink_log
            .lock()
            .expect("event lock poisoned")
            .push(event.clone());
    });
    (sink, log)
}

/// Backend whose writes always fail; reads and deletes go to memory.
#[derive(Default)]
pub struct ReadOnlyBackend {
    inner: Arc<MemoryBackend>,
}

impl ReadOnlyBackend {
    /// Backend already holding `record` under `service`.
    pub fn seeded(service: &str, record: &TokenRecord) -> Self {
        let inner = Arc::new(MemoryBackend::new());
        let writer = SecureCredentialStore::new(inner.clone(), service);
        assert!(writer.save_record(record), "seeding memory backend");
        Self { inner }
    }
}

impl SecretBackend for ReadOnlyBackend {
    fn get(&self, service: &str, key: &str) -> Result<Option<String>, AuthError> {
        self.inner.get(service, key)
    }

    fn set(&self, _service: &str, _key: &str, _value: &str) -> Result<(), AuthError> {
        Err(AuthError::Storage("keychain is read-only".to_string()))
    }

    fn delete(&self, service: &str, key: &str) -> Result<(), AuthError> {
        self.inner.delete(service, key)
    }
}
