//! Session credential and its persisted record

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// A credential is treated as expired this long before its real expiry
pub const SAFETY_MARGIN_SECS: i64 = 5 * 60;

/// An opaque session secret bound to one endpoint
#[derive(Debug, Clone)]
pub struct Credential {
    secret: SecretString,
    expires_at: DateTime<Utc>,
    bound_endpoint: String,
}

impl Credential {
    pub fn new<S, E>(secret: S, expires_at: DateTime<Utc>, bound_endpoint: E) -> Self
    where
        S: Into<String>,
        E: Into<String>,
    {
        Self {
            secret: SecretString::new(secret.into()),
            expires_at,
            bound_endpoint: bound_endpoint.into(),
        }
    }

    /// Same secret and expiry, bound to `endpoint`
    pub fn with_bound_endpoint<E: Into<String>>(self, endpoint: E) -> Self {
        Self {
            bound_endpoint: endpoint.into(),
            ..self
        }
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn bound_endpoint(&self) -> &str {
        &self.bound_endpoint
    }

    /// Whether the credential is within its safety margin at `now`
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(SAFETY_MARGIN_SECS) < self.expires_at
    }

    /// Usable for `endpoint` at `now`
    pub fn is_valid_for(&self, endpoint: &str, now: DateTime<Utc>) -> bool {
        self.bound_endpoint == endpoint && self.is_fresh_at(now)
    }

    /// Render as a `Cookie` header value
    pub fn cookie_header(&self, cookie_name: &str) -> SecretString {
        SecretString::new(format!("{}={}", cookie_name, self.secret.expose_secret()))
    }
}

/// On-disk shape: `{cookie, expires_at, url}`
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CredentialRecord {
    pub cookie: String,
    pub expires_at: DateTime<Utc>,
    pub url: String,
}

impl CredentialRecord {
    pub(crate) fn from_credential(credential: &Credential, endpoint: &str) -> Self {
        Self {
            cookie: credential.secret.expose_secret().clone(),
            expires_at: credential.expires_at,
            url: endpoint.to_string(),
        }
    }

    pub(crate) fn into_credential(self) -> Credential {
        Credential::new(self.cookie, self.expires_at, self.url)
    }
}
