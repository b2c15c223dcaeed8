//! Start-up credential acquisition: cache first, SSO otherwise

use crate::auth::credential::Credential;
use crate::auth::credential_store::CredentialStore;
use crate::auth::sso::SsoAuthenticator;
use crate::error::{ChipError, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

/// Combines the credential cache and the SSO authenticator
///
/// Intended to run once at start-up before any dispatch; it is not guarded against
/// concurrent re-entry.
pub struct SessionManager {
    store: CredentialStore,
    authenticator: SsoAuthenticator,
    cancel: CancellationToken,
}

impl SessionManager {
    pub fn new(store: CredentialStore, authenticator: SsoAuthenticator) -> Self {
        Self {
            store,
            authenticator,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token (e.g. tied to Ctrl-C)
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn authenticator(&self) -> &SsoAuthenticator {
        &self.authenticator
    }

    /// Return a usable credential for `endpoint`, running SSO when the cache has none
    ///
    /// Authenticator failures are returned unchanged; a failure to cache the fresh
    /// credential is only logged.
    pub async fn ensure_credential(&self, endpoint: &str, timeout: Duration) -> Result<Credential> {
        if let Some(credential) = self.store.load(endpoint) {
            info!(
                "Using cached SSO session (expires at {})",
                credential.expires_at().to_rfc3339()
            );
            return Ok(credential);
        }

        let target = Url::parse(endpoint)
            .map_err(|e| ChipError::config(format!("Invalid SSO endpoint '{}': {}", endpoint, e)))?;
        let credential = self
            .authenticator
            .authenticate(&target, timeout, &self.cancel)
            .await?
            .with_bound_endpoint(endpoint);

        if let Err(e) = self.store.save(&credential, endpoint) {
            warn!("Failed to cache SSO session, continuing without cache: {}", e);
        }
        Ok(credential)
    }
}
