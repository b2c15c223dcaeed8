//! Browser-driven SSO login
//!
//! [`SsoAuthenticator`] opens the target URL in a browser, lets the identity
//! provider run its redirect chain, and polls until the target service has set its
//! session cookie. The browser is closed on every exit path.

use crate::auth::credential::Credential;
use crate::error::{ChipError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Name of the Collibra session cookie
pub const SESSION_COOKIE_NAME: &str = "JSESSIONID";
/// Maximum time to wait for SSO authentication
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
/// Interval between cookie jar inspections
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Lifetime assumed for a session cookie without its own expiry
pub const DEFAULT_SESSION_LIFETIME_SECS: i64 = 30 * 60;

/// A cookie as reported by the browser
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    /// Expiry in seconds since the Unix epoch; `None` or non-positive for session cookies
    pub expires: Option<f64>,
}

/// A running browser the authenticator can drive
#[async_trait]
pub trait BrowserSession: Send {
    /// Open `url` in the browser's page
    async fn navigate(&mut self, url: &Url) -> Result<()>;

    /// Location of the page right now
    async fn current_url(&mut self) -> Result<Url>;

    /// Cookies the browser would send to `url`
    async fn cookies(&mut self, url: &Url) -> Result<Vec<BrowserCookie>>;

    /// Terminate the browser; must be safe to call once after any failure
    async fn close(&mut self) -> Result<()>;
}

/// Starts a browser session
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// Runs the SSO login state machine
pub struct SsoAuthenticator {
    launcher: Arc<dyn BrowserLauncher>,
    poll_interval: Duration,
    cookie_name: String,
    default_lifetime: chrono::Duration,
}

impl SsoAuthenticator {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            launcher,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cookie_name: SESSION_COOKIE_NAME.to_string(),
            default_lifetime: chrono::Duration::seconds(DEFAULT_SESSION_LIFETIME_SECS),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_cookie_name<S: Into<String>>(mut self, name: S) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_default_lifetime(mut self, lifetime: chrono::Duration) -> Self {
        self.default_lifetime = lifetime;
        self
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Log in through the browser and return the session credential for `target`
    ///
    /// Fails with [`ChipError::SsoTimeout`] when no cookie shows up within
    /// `timeout` (zero means the default) and with [`ChipError::SsoCancelled`]
    /// when `cancel` fires first.
    pub async fn authenticate(
        &self,
        target: &Url,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Credential> {
        let timeout = if timeout.is_zero() { DEFAULT_TIMEOUT } else { timeout };
        info!("Starting SSO authentication for {}", target);

        let mut browser = self
            .launcher
            .launch()
            .await
            .map_err(|e| match e {
                ChipError::BrowserLaunch { .. } => e,
                other => ChipError::browser_launch(other.to_string()),
            })?;

        // The deadline covers navigation and every browser call, not just the gaps between polls
        let deadline = Instant::now() + timeout;
        let result = match tokio::time::timeout_at(
            deadline,
            self.drive(browser.as_mut(), target, cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ChipError::SsoTimeout {
                timeout_secs: timeout.as_secs(),
            }),
        };

        if let Err(e) = browser.close().await {
            warn!("Failed to close SSO browser: {}", e);
        } else {
            debug!("SSO browser closed");
        }

        match &result {
            Ok(credential) => info!(
                "SSO authentication successful, session expires at {}",
                credential.expires_at().to_rfc3339()
            ),
            Err(e) => warn!("SSO authentication failed: {}", e),
        }
        result
    }

    async fn drive(
        &self,
        browser: &mut dyn BrowserSession,
        target: &Url,
        cancel: &CancellationToken,
    ) -> Result<Credential> {
        tokio::select! {
            _ = cancel.cancelled() => return Err(ChipError::SsoCancelled),
            navigated = browser.navigate(target) => navigated?,
        }
        info!("Waiting for SSO login to complete in the browser...");

        let mut polls = 0u32;
        loop {
            polls += 1;
            let found = tokio::select! {
                _ = cancel.cancelled() => return Err(ChipError::SsoCancelled),
                found = self.poll_once(browser, target) => found,
            };
            if let Some(credential) = found {
                debug!("Session cookie found after {} polls", polls);
                return Ok(credential);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ChipError::SsoCancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// One inspection of the browser; failures are transient while the IdP redirects
    async fn poll_once(&self, browser: &mut dyn BrowserSession, target: &Url) -> Option<Credential> {
        let current = match browser.current_url().await {
            Ok(url) => url,
            Err(e) => {
                debug!("Could not read browser location: {}", e);
                return None;
            }
        };
        if !same_host(&current, target) {
            debug!("Browser is on {}, waiting for {}", current.host_str().unwrap_or(""), target.host_str().unwrap_or(""));
            return None;
        }

        let cookies = match browser.cookies(target).await {
            Ok(cookies) => cookies,
            Err(e) => {
                debug!("Could not read browser cookies: {}", e);
                return None;
            }
        };

        cookies
            .into_iter()
            .find(|c| c.name == self.cookie_name && !c.value.is_empty())
            .map(|cookie| {
                let expires_at = self.cookie_expiry(cookie.expires);
                Credential::new(cookie.value, expires_at, target.as_str())
            })
    }

    fn cookie_expiry(&self, expires: Option<f64>) -> DateTime<Utc> {
        expires
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
            .unwrap_or_else(|| Utc::now() + self.default_lifetime)
    }
}

fn same_host(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}
