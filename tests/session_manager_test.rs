//! End-to-end credential acquisition: cache miss, SSO, cache hit

use async_trait::async_trait;
use chip::auth::{
    BrowserCookie, BrowserLauncher, BrowserSession, Credential, CredentialStore, SessionManager,
    SsoAuthenticator,
};
use chip::error::{ChipError, Result};
use chrono::{Duration as ChronoDuration, Utc};
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

const ENDPOINT: &str = "https://acme.collibra.com";

/// Browser whose session cookie appears on the given poll
struct ScriptedLauncher {
    found_on_poll: Option<usize>,
    expires: f64,
    launches: Arc<AtomicUsize>,
    polls: Arc<AtomicUsize>,
}

struct ScriptedSession {
    found_on_poll: Option<usize>,
    expires: f64,
    polls: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            found_on_poll: self.found_on_poll,
            expires: self.expires,
            polls: Arc::clone(&self.polls),
        }))
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&mut self, _url: &Url) -> Result<()> {
        Ok(())
    }

    async fn current_url(&mut self) -> Result<Url> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(Url::parse(ENDPOINT).unwrap())
    }

    async fn cookies(&mut self, _url: &Url) -> Result<Vec<BrowserCookie>> {
        let polls = self.polls.load(Ordering::SeqCst);
        match self.found_on_poll {
            Some(n) if polls >= n => Ok(vec![BrowserCookie {
                name: "JSESSIONID".to_string(),
                value: "abc123".to_string(),
                domain: "acme.collibra.com".to_string(),
                expires: Some(self.expires),
            }]),
            _ => Ok(Vec::new()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct Harness {
    manager: SessionManager,
    launches: Arc<AtomicUsize>,
    polls: Arc<AtomicUsize>,
}

fn harness(cache_path: std::path::PathBuf, found_on_poll: Option<usize>) -> Harness {
    let launches = Arc::new(AtomicUsize::new(0));
    let polls = Arc::new(AtomicUsize::new(0));
    let launcher = Arc::new(ScriptedLauncher {
        found_on_poll,
        expires: (Utc::now().timestamp() + 1800) as f64,
        launches: Arc::clone(&launches),
        polls: Arc::clone(&polls),
    });
    let authenticator =
        SsoAuthenticator::new(launcher).with_poll_interval(Duration::from_millis(10));
    Harness {
        manager: SessionManager::new(CredentialStore::new(Some(cache_path)), authenticator),
        launches,
        polls,
    }
}

#[tokio::test]
async fn test_sso_then_cache_hit() {
    let dir = TempDir::new().unwrap();
    let h = harness(dir.path().join("session_cache.json"), Some(2));

    let first = h
        .manager
        .ensure_credential(ENDPOINT, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(first.secret().expose_secret(), "abc123");
    assert_eq!(h.launches.load(Ordering::SeqCst), 1);
    assert_eq!(h.polls.load(Ordering::SeqCst), 2);
    let remaining = first.expires_at() - Utc::now();
    assert!(remaining > ChronoDuration::minutes(29));

    let second = h
        .manager
        .ensure_credential(ENDPOINT, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(second.secret().expose_secret(), "abc123");
    assert_eq!(h.launches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_valid_cache_skips_browser() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session_cache.json");
    CredentialStore::new(Some(path.clone()))
        .save(
            &Credential::new("cached", Utc::now() + ChronoDuration::minutes(30), ENDPOINT),
            ENDPOINT,
        )
        .unwrap();

    let h = harness(path, None);
    let credential = h
        .manager
        .ensure_credential(ENDPOINT, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(credential.secret().expose_secret(), "cached");
    assert_eq!(h.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cache_for_other_endpoint_triggers_sso() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session_cache.json");
    CredentialStore::new(Some(path.clone()))
        .save(
            &Credential::new(
                "foreign",
                Utc::now() + ChronoDuration::minutes(30),
                "https://other.collibra.com",
            ),
            "https://other.collibra.com",
        )
        .unwrap();

    let h = harness(path, Some(1));
    let credential = h
        .manager
        .ensure_credential(ENDPOINT, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(credential.secret().expose_secret(), "abc123");
    assert_eq!(h.launches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_save_failure_still_returns_credential() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();

    let h = harness(blocker.join("session_cache.json"), Some(1));
    let credential = h
        .manager
        .ensure_credential(ENDPOINT, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(credential.secret().expose_secret(), "abc123");
}

#[tokio::test]
async fn test_authenticator_failure_is_propagated() {
    let dir = TempDir::new().unwrap();
    let h = harness(dir.path().join("session_cache.json"), None);

    let err = h
        .manager
        .ensure_credential(ENDPOINT, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, ChipError::SsoTimeout { .. }));
    assert!(!dir.path().join("session_cache.json").exists());
}
