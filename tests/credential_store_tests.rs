mod auth_support;

use std::sync::Arc;

use devicegrant::auth::{CredentialKey, FileBackend, SecureCredentialStore};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use auth_support::{record, start_time};

fn file_store(dir: &TempDir, service: &str) -> SecureCredentialStore {
    SecureCredentialStore::new(Arc::new(FileBackend::new(dir.path().to_path_buf())), service)
}

#[test]
fn record_survives_a_new_store_instance() {
    let dir = TempDir::new().unwrap();
    let saved = record(
        "at-1",
        Some("rt-1"),
        start_time() + chrono::Duration::hours(1),
        &["read:users", "offline_access"],
    );
    assert!(file_store(&dir, "devicegrant").save_record(&saved));

    let reopened = file_store(&dir, "devicegrant");
    assert_eq!(reopened.load_record(), Some(saved));
    assert_eq!(
        reopened.get(CredentialKey::ExpiresAt),
        Some((start_time() + chrono::Duration::hours(1)).timestamp_millis().to_string())
    );
    assert_eq!(
        reopened.get(CredentialKey::GrantedScopes).as_deref(),
        Some("offline_access read:users")
    );
}

#[test]
fn services_are_isolated() {
    let dir = TempDir::new().unwrap();
    let prod = file_store(&dir, "devicegrant-prod");
    let staging = file_store(&dir, "devicegrant-staging");

    assert!(prod.save_record(&record(
        "at-prod",
        None,
        start_time(),
        &["read:users"]
    )));
    assert!(staging.load_record().is_none());
    assert!(staging.clear());
    assert!(prod.load_record().is_some());
}

#[test]
fn partial_record_is_treated_as_absent() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir, "devicegrant");
    assert!(store.set(CredentialKey::AccessToken, "at-orphan"));
    assert!(store.load_record().is_none());

    assert!(store.set(CredentialKey::ExpiresAt, "not-a-number"));
    assert!(store.set(CredentialKey::Tenant, "acme.example.com"));
    assert!(store.load_record().is_none());

    assert!(store.clear());
    assert!(store.get(CredentialKey::AccessToken).is_none());
}

#[test]
fn dropping_the_refresh_token_deletes_it() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir, "devicegrant");
    let expires_at = start_time() + chrono::Duration::hours(1);
    assert!(store.save_record(&record("at-1", Some("rt-1"), expires_at, &["read:users"])));
    assert!(store.save_record(&record("at-2", None, expires_at, &["read:users"])));

    assert!(store.get(CredentialKey::RefreshToken).is_none());
    assert_eq!(
        store.load_record().map(|r| r.access_token).as_deref(),
        Some("at-2")
    );
}
