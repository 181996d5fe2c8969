//! Best-effort secret storage for the credential record.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};
use tracing::{debug, warn};

use super::error::AuthError;
use super::scope::parse_scopes;
use super::token::TokenRecord;

const STORE_FILE_VERSION: u32 = 1;

/// Logical entries kept under the service identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum CredentialKey {
    AccessToken,
    RefreshToken,
    /// Epoch milliseconds as a decimal string.
    ExpiresAt,
    Tenant,
    /// Space-joined scope list.
    GrantedScopes,
}

/// Raw secret storage keyed by `(service, key)`.
pub trait SecretBackend: Send + Sync {
    fn get(&self, service: &str, key: &str) -> Result<Option<String>, AuthError>;
    fn set(&self, service: &str, key: &str, value: &str) -> Result<(), AuthError>;
    fn delete(&self, service: &str, key: &str) -> Result<(), AuthError>;
}

/// OS keychain backend (macOS Keychain, Windows Credential Manager, Secret Service).
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringBackend;

impl SecretBackend for KeyringBackend {
    fn get(&self, service: &str, key: &str) -> Result<Option<String>, AuthError> {
        let entry = keyring::Entry::new(service, key)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, service: &str, key: &str, value: &str) -> Result<(), AuthError> {
        let entry = keyring::Entry::new(service, key)?;
        entry.set_password(value)?;
        Ok(())
    }

    fn delete(&self, service: &str, key: &str) -> Result<(), AuthError> {
        let entry = keyring::Entry::new(service, key)?;
        match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// File-backed secrets for hosts without a keychain.
///
/// One TOML file per service, written atomically with `0600` permissions.
///
/// # Example
/// ```no_run
/// use devicegrant::auth::{FileBackend, SecretBackend};
///
/// let backend = FileBackend::new_default();
/// backend.set("devicegrant", "tenant", "acme.example.com")?;
/// # Ok::<(), devicegrant::auth::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileBackend {
    base_dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileBackend {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn new_default() -> Self {
        Self::new(default_store_dir())
    }

    fn store_path(&self, service: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.toml", normalize_label(service)))
    }

    fn read_file(&self, service: &str) -> Result<StoreFile, AuthError> {
        let path = self.store_path(service);
        let raw = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreFile::empty(service))
            }
            Err(err) => return Err(AuthError::Io(err.to_string())),
        };
        let file: StoreFile = toml::from_str(&raw)?;
        if file.version != STORE_FILE_VERSION {
            return Err(AuthError::Storage(format!(
                "unsupported credential file version {} at {}",
                file.version,
                path.display()
            )));
        }
        Ok(file)
    }

    fn write_file(&self, service: &str, mut file: StoreFile) -> Result<(), AuthError> {
        file.saved_at = Utc::now();
        let serialized = toml::to_string(&file)?;
        atomic_write(&self.store_path(service), serialized.as_bytes())
    }

    fn update<F>(&self, service: &str, apply: F) -> Result<(), AuthError>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AuthError::Storage("credential file lock poisoned".to_string()))?;
        let mut file = self.read_file(service)?;
        apply(&mut file.entries);
        self.write_file(service, file)
    }
}

impl SecretBackend for FileBackend {
    fn get(&self, service: &str, key: &str) -> Result<Option<String>, AuthError> {
        Ok(self.read_file(service)?.entries.get(key).cloned())
    }

    fn set(&self, service: &str, key: &str, value: &str) -> Result<(), AuthError> {
        self.update(service, |entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn delete(&self, service: &str, key: &str) -> Result<(), AuthError> {
        if !self.store_path(service).exists() {
            return Ok(());
        }
        self.update(service, |entries| {
            entries.remove(key);
        })
    }
}

/// Process-local backend; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretBackend for MemoryBackend {
    fn get(&self, service: &str, key: &str) -> Result<Option<String>, AuthError> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| AuthError::Storage("memory store lock poisoned".to_string()))?;
        Ok(guard.get(&(service.to_string(), key.to_string())).cloned())
    }

    fn set(&self, service: &str, key: &str, value: &str) -> Result<(), AuthError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| AuthError::Storage("memory store lock poisoned".to_string()))?;
        guard.insert((service.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn delete(&self, service: &str, key: &str) -> Result<(), AuthError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| AuthError::Storage("memory store lock poisoned".to_string()))?;
        guard.remove(&(service.to_string(), key.to_string()));
        Ok(())
    }
}

/// Namespaced, non-throwing view over a [`SecretBackend`].
///
/// Every call is independent. Backend failures are logged and reported as
/// `None`/`false` ("not available").
///
/// # Example
/// ```
/// use devicegrant::auth::{CredentialKey, SecureCredentialStore};
///
/// let store = SecureCredentialStore::in_memory("devicegrant-doc");
/// assert!(store.set(CredentialKey::Tenant, "acme.example.com"));
/// assert_eq!(store.get(CredentialKey::Tenant).as_deref(), Some("acme.example.com"));
/// assert!(store.load_record().is_none());
/// ```
pub struct SecureCredentialStore {
    backend: Arc<dyn SecretBackend>,
    service: String,
}

impl SecureCredentialStore {
    pub fn new(backend: Arc<dyn SecretBackend>, service: impl Into<String>) -> Self {
        Self {
            backend,
            service: service.into(),
        }
    }

    pub fn in_memory(service: impl Into<String>) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), service)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn get(&self, key: CredentialKey) -> Option<String> {
        match self.backend.get(&self.service, key.as_ref()) {
            Ok(value) => value,
            Err(err) => {
                warn!(service = %self.service, key = %key, error = %err, "credential read failed");
                None
            }
        }
    }

    pub fn set(&self, key: CredentialKey, value: &str) -> bool {
        match self.backend.set(&self.service, key.as_ref(), value) {
            Ok(()) => true,
            Err(err) => {
                warn!(service = %self.service, key = %key, error = %err, "credential write failed");
                false
            }
        }
    }

    pub fn delete(&self, key: CredentialKey) -> bool {
        match self.backend.delete(&self.service, key.as_ref()) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    service = %self.service,
                    key = %key,
                    error = %err,
                    "credential delete failed"
                );
                false
            }
        }
    }

    /// The stored record, or `None` unless token, expiry and tenant are all present.
    pub fn load_record(&self) -> Option<TokenRecord> {
        let access_token = self.get(CredentialKey::AccessToken)?;
        let expires_at = self.get(CredentialKey::ExpiresAt)?;
        let expires_at = match parse_epoch_millis(&expires_at) {
            Some(value) => value,
            None => {
                warn!(
                    service = %self.service,
                    "stored expiry is not epoch milliseconds; ignoring record"
                );
                return None;
            }
        };
        let tenant = self.get(CredentialKey::Tenant)?;
        let granted_scopes = self
            .get(CredentialKey::GrantedScopes)
            .map(|raw| parse_scopes(&raw))
            .unwrap_or_default();
        Some(TokenRecord {
            access_token,
            refresh_token: self.get(CredentialKey::RefreshToken),
            expires_at,
            tenant,
            granted_scopes,
        })
    }

    /// Write every entry of `record`. On a failed write the previous values
    /// are restored best-effort and `false` is returned.
    pub fn save_record(&self, record: &TokenRecord) -> bool {
        let scopes = record
            .granted_scopes
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        let expires_at = record.expires_at.timestamp_millis().to_string();
        // Expiry goes last so a torn write never pairs a new expiry with an old token.
        let plan: [(CredentialKey, Option<&str>); 5] = [
            (CredentialKey::RefreshToken, record.refresh_token.as_deref()),
            (CredentialKey::Tenant, Some(record.tenant.as_str())),
            (CredentialKey::GrantedScopes, Some(scopes.as_str())),
            (CredentialKey::AccessToken, Some(record.access_token.as_str())),
            (CredentialKey::ExpiresAt, Some(expires_at.as_str())),
        ];

        let snapshot: Vec<(CredentialKey, Option<String>)> =
            plan.iter().map(|(key, _)| (*key, self.get(*key))).collect();

        for (written, (key, value)) in plan.iter().enumerate() {
            let ok = match value {
                Some(value) => self.set(*key, value),
                None => self.delete(*key),
            };
            if !ok {
                warn!(
                    service = %self.service,
                    key = %key,
                    "credential record write failed; restoring previous values"
                );
                self.restore(&snapshot[..=written]);
                return false;
            }
        }
        debug!(service = %self.service, expires_at = %record.expires_at, "credential record saved");
        true
    }

    /// Remove every entry. Returns `false` if any delete failed.
    pub fn clear(&self) -> bool {
        CredentialKey::iter().fold(true, |ok, key| self.delete(key) && ok)
    }

    fn restore(&self, snapshot: &[(CredentialKey, Option<String>)]) {
        for (key, previous) in snapshot {
            match previous {
                Some(value) => {
                    self.set(*key, value);
                }
                None => {
                    self.delete(*key);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    service: String,
    saved_at: DateTime<Utc>,
    entries: BTreeMap<String, String>,
}

impl StoreFile {
    fn empty(service: &str) -> Self {
        Self {
            version: STORE_FILE_VERSION,
            service: service.to_string(),
            saved_at: Utc::now(),
            entries: BTreeMap::new(),
        }
    }
}

fn parse_epoch_millis(raw: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = raw.trim().parse().ok()?;
    DateTime::<Utc>::from_timestamp_millis(millis)
}

/// Default directory for the file backend (`~/.devicegrant`).
pub fn default_store_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".devicegrant"))
        .unwrap_or_else(|| PathBuf::from(".devicegrant"))
}

fn normalize_label(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "default".to_string();
    }
    let out: String = trimmed
        .chars()
        .map(|ch| {
            let lower = ch.to_ascii_lowercase();
            if lower.is_ascii_alphanumeric() || lower == '-' || lower == '.' {
                lower
            } else {
                '-'
            }
        })
        .collect();
    if out.trim_matches(|c| c == '-' || c == '.').is_empty() {
        "default".to_string()
    } else {
        out
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path.file_name().ok_or_else(|| {
        AuthError::Storage(format!("credential path {} has no file name", path.display()))
    })?;

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_name = format!(
        ".{}.tmp-{}-{nonce}",
        file_name.to_string_lossy(),
        std::process::id()
    );
    let temp_path = path.with_file_name(temp_name);

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = options.open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn sample_record() -> TokenRecord {
        TokenRecord {
            access_token: "access-1".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: DateTime::<Utc>::from_timestamp_millis(1_900_000_000_000).unwrap(),
            tenant: "acme.example.com".to_string(),
            granted_scopes: ["read:users", "offline_access"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Memory backend that rejects writes to one key.
    struct RejectingBackend {
        inner: MemoryBackend,
        reject: &'static str,
    }

    impl SecretBackend for RejectingBackend {
        fn get(&self, service: &str, key: &str) -> Result<Option<String>, AuthError> {
            self.inner.get(service, key)
        }

        fn set(&self, service: &str, key: &str, value: &str) -> Result<(), AuthError> {
            if key == self.reject {
                return Err(AuthError::Storage("keychain locked".to_string()));
            }
            self.inner.set(service, key, value)
        }

        fn delete(&self, service: &str, key: &str) -> Result<(), AuthError> {
            self.inner.delete(service, key)
        }
    }

    #[test]
    fn key_names_are_snake_case() {
        let names: Vec<String> = CredentialKey::iter().map(|k| k.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "access_token",
                "refresh_token",
                "expires_at",
                "tenant",
                "granted_scopes"
            ]
        );
    }

    #[test]
    fn record_round_trips_through_memory_store() {
        let store = SecureCredentialStore::in_memory("test");
        assert!(store.save_record(&sample_record()));
        assert_eq!(store.load_record(), Some(sample_record()));
        assert_eq!(
            store.get(CredentialKey::ExpiresAt).as_deref(),
            Some("1900000000000")
        );
    }

    #[test]
    fn record_without_expiry_is_treated_as_absent() {
        let store = SecureCredentialStore::in_memory("test");
        store.set(CredentialKey::AccessToken, "orphan");
        store.set(CredentialKey::Tenant, "acme.example.com");
        assert!(store.load_record().is_none());

        store.set(CredentialKey::ExpiresAt, "not-a-number");
        assert!(store.load_record().is_none());
    }

    #[test]
    fn saving_record_without_refresh_token_removes_stale_one() {
        let store = SecureCredentialStore::in_memory("test");
        store.set(CredentialKey::RefreshToken, "stale");
        let mut record = sample_record();
        record.refresh_token = None;
        assert!(store.save_record(&record));
        assert!(store.get(CredentialKey::RefreshToken).is_none());
    }

    #[test]
    fn failed_write_restores_previous_record() {
        let backend = Arc::new(RejectingBackend {
            inner: MemoryBackend::new(),
            reject: "expires_at",
        });
        let store = SecureCredentialStore::new(backend.clone(), "test");
        let previous = sample_record();
        backend
            .inner
            .set("test", "access_token", &previous.access_token)
            .unwrap();
        backend
            .inner
            .set("test", "refresh_token", "refresh-1")
            .unwrap();
        backend
            .inner
            .set("test", "expires_at", "1900000000000")
            .unwrap();
        backend
            .inner
            .set("test", "tenant", "acme.example.com")
            .unwrap();
        backend
            .inner
            .set("test", "granted_scopes", "offline_access read:users")
            .unwrap();

        let replacement = TokenRecord {
            access_token: "access-2".to_string(),
            refresh_token: Some("refresh-2".to_string()),
            expires_at: DateTime::<Utc>::from_timestamp_millis(1_950_000_000_000).unwrap(),
            tenant: "other.example.com".to_string(),
            granted_scopes: BTreeSet::new(),
        };
        assert!(!store.save_record(&replacement));
        assert_eq!(store.load_record(), Some(previous));
    }

    #[test]
    fn clear_removes_every_entry() {
        let store = SecureCredentialStore::in_memory("test");
        store.save_record(&sample_record());
        assert!(store.clear());
        for key in CredentialKey::iter() {
            assert!(store.get(key).is_none(), "{key} survived clear");
        }
    }

    #[test]
    fn backend_errors_degrade_to_unavailable() {
        let store = SecureCredentialStore::new(
            Arc::new(RejectingBackend {
                inner: MemoryBackend::new(),
                reject: "tenant",
            }),
            "test",
        );
        assert!(!store.set(CredentialKey::Tenant, "acme"));
        assert!(store.get(CredentialKey::Tenant).is_none());
    }

    #[test]
    fn file_backend_round_trip_and_permissions() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf());
        backend.set("devicegrant", "tenant", "acme").unwrap();
        backend.set("devicegrant", "access_token", "tok").unwrap();
        assert_eq!(
            backend.get("devicegrant", "tenant").unwrap().as_deref(),
            Some("acme")
        );
        backend.delete("devicegrant", "tenant").unwrap();
        assert!(backend.get("devicegrant", "tenant").unwrap().is_none());
        assert_eq!(
            backend.get("devicegrant", "access_token").unwrap().as_deref(),
            Some("tok")
        );

        #[cfg(unix)]
        {
            let mode = fs::metadata(dir.path().join("devicegrant.toml"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn file_backend_missing_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf());
        assert!(backend.get("devicegrant", "tenant").unwrap().is_none());
        backend.delete("devicegrant", "tenant").unwrap();
        assert!(!dir.path().join("devicegrant.toml").exists());
    }

    #[test]
    fn file_backend_rejects_unknown_version() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("devicegrant.toml"),
            "version = 9\nservice = \"devicegrant\"\nsaved_at = \"2026-01-01T00:00:00Z\"\n\n[entries]\n",
        )
        .unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf());
        assert!(matches!(
            backend.get("devicegrant", "tenant"),
            Err(AuthError::Storage(message)) if message.contains("version 9")
        ));
    }

    #[test]
    fn normalize_label_replaces_unsafe_characters() {
        assert_eq!(normalize_label("Dev Grant/Prod"), "dev-grant-prod");
        assert_eq!(normalize_label("  "), "default");
        assert_eq!(normalize_label("../"), "default");
    }
}
