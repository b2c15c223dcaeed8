//! Authentication for outbound API calls
//!
//! Session credentials are obtained through a browser SSO login, cached on disk
//! per endpoint, and reused until they come within a safety margin of expiry.

pub mod chrome;
pub mod credential;
pub mod credential_store;
pub mod session_manager;
pub mod sso;

pub use chrome::ChromeLauncher;
pub use credential::{Credential, SAFETY_MARGIN_SECS};
pub use credential_store::CredentialStore;
pub use session_manager::SessionManager;
pub use sso::{
    BrowserCookie, BrowserLauncher, BrowserSession, SsoAuthenticator, DEFAULT_POLL_INTERVAL,
    DEFAULT_SESSION_LIFETIME_SECS, DEFAULT_TIMEOUT, SESSION_COOKIE_NAME,
};
