//! Tests for the file-backed credential store

use chip::auth::{Credential, CredentialStore};
use chip::error::ChipError;
use chrono::{Duration, Utc};
use secrecy::ExposeSecret;
use tempfile::TempDir;

const ENDPOINT: &str = "https://acme.collibra.com";

fn store_in(dir: &TempDir) -> CredentialStore {
    CredentialStore::new(Some(dir.path().join("collibra").join("session_cache.json")))
}

#[test]
fn test_save_then_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let credential = Credential::new("abc123", Utc::now() + Duration::minutes(30), ENDPOINT);

    store.save(&credential, ENDPOINT).unwrap();
    let loaded = store.load(ENDPOINT).expect("credential should load");

    assert_eq!(loaded.secret().expose_secret(), "abc123");
    assert_eq!(loaded.bound_endpoint(), ENDPOINT);
    assert_eq!(loaded.expires_at().timestamp(), credential.expires_at().timestamp());
}

#[test]
fn test_load_for_other_endpoint_returns_none() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let credential = Credential::new("abc123", Utc::now() + Duration::minutes(30), ENDPOINT);
    store.save(&credential, ENDPOINT).unwrap();

    assert!(store.load("https://other.collibra.com").is_none());
}

#[test]
fn test_load_within_safety_margin_returns_none() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    let expiring = Credential::new("abc123", Utc::now() + Duration::minutes(4), ENDPOINT);
    store.save(&expiring, ENDPOINT).unwrap();
    assert!(store.load(ENDPOINT).is_none());

    let expired = Credential::new("abc123", Utc::now() - Duration::minutes(1), ENDPOINT);
    store.save(&expired, ENDPOINT).unwrap();
    assert!(store.load(ENDPOINT).is_none());
}

#[test]
fn test_missing_and_malformed_records_return_none() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    assert!(store.load(ENDPOINT).is_none());

    std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
    std::fs::write(store.path(), "{ not json").unwrap();
    assert!(store.load(ENDPOINT).is_none());

    std::fs::write(store.path(), r#"{"cookie": "abc", "url": "https://acme.collibra.com"}"#).unwrap();
    assert!(store.load(ENDPOINT).is_none());
}

#[test]
fn test_record_format_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let credential = Credential::new("abc123", Utc::now() + Duration::minutes(30), ENDPOINT);
    store.save(&credential, ENDPOINT).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(raw["cookie"], "abc123");
    assert_eq!(raw["url"], ENDPOINT);
    let expires_at = raw["expires_at"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(expires_at).is_ok());
}

#[cfg(unix)]
#[test]
fn test_file_and_directory_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let credential = Credential::new("abc123", Utc::now() + Duration::minutes(30), ENDPOINT);
    store.save(&credential, ENDPOINT).unwrap();

    let file_mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
    assert_eq!(file_mode & 0o777, 0o600);

    let dir_mode = std::fs::metadata(store.path().parent().unwrap())
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(dir_mode & 0o077, 0);
}

#[test]
fn test_clear_removes_record_and_tolerates_absence() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let credential = Credential::new("abc123", Utc::now() + Duration::minutes(30), ENDPOINT);
    store.save(&credential, ENDPOINT).unwrap();

    store.clear().unwrap();
    assert!(!store.path().exists());
    assert!(store.load(ENDPOINT).is_none());

    // Already gone
    store.clear().unwrap();
}

#[test]
fn test_unwritable_location_is_persistence_error() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();

    let store = CredentialStore::new(Some(blocker.join("session_cache.json")));
    let credential = Credential::new("abc123", Utc::now() + Duration::minutes(30), ENDPOINT);

    let err = store.save(&credential, ENDPOINT).unwrap_err();
    assert!(matches!(err, ChipError::Persistence { .. }));
}
