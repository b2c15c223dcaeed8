//! File-backed credential cache
//!
//! There is no in-process cache: every `load`/`save` goes to disk. The file is the
//! only record of whether a usable session already exists.

use crate::auth::credential::{Credential, CredentialRecord};
use crate::error::{ChipError, Result};
use chrono::Utc;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CACHE_DIR_NAME: &str = "collibra";
const CACHE_FILE_NAME: &str = "session_cache.json";

/// Persists one credential record as JSON
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store at `path`, or at `<config dir>/collibra/session_cache.json`
    pub fn new(path: Option<PathBuf>) -> Self {
        let path = path.unwrap_or_else(Self::default_path);
        Self { path }
    }

    /// Default cache location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(CACHE_DIR_NAME)
            .join(CACHE_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load a credential usable for `endpoint`
    ///
    /// A missing, unreadable, malformed, foreign or expiring record yields `None`.
    pub fn load(&self, endpoint: &str) -> Option<Credential> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No cached SSO session at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to read SSO session cache {}: {}", self.path.display(), e);
                return None;
            }
        };

        let record: CredentialRecord = match serde_json::from_str(&content) {
            Ok(record) => record,
            Err(e) => {
                info!("Discarding malformed SSO session cache {}: {}", self.path.display(), e);
                return None;
            }
        };

        let credential = record.into_credential();
        if credential.bound_endpoint() != endpoint {
            info!(
                "Cached SSO session is for {}, not {}; re-authentication required",
                credential.bound_endpoint(),
                endpoint
            );
            return None;
        }
        if !credential.is_fresh_at(Utc::now()) {
            info!(
                "Cached SSO session expires at {}; re-authentication required",
                credential.expires_at().to_rfc3339()
            );
            return None;
        }

        debug!("Using cached SSO session for {}", endpoint);
        Some(credential)
    }

    /// Persist `credential` for `endpoint`, creating the parent directory if needed
    pub fn save(&self, credential: &Credential, endpoint: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_private_dir(parent).map_err(|e| {
                ChipError::persistence(format!(
                    "Failed to create cache directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let record = CredentialRecord::from_credential(credential, endpoint);
        let content = serde_json::to_vec_pretty(&record)?;
        write_private_file(&self.path, &content).map_err(|e| {
            ChipError::persistence(format!(
                "Failed to write session cache {}: {}",
                self.path.display(),
                e
            ))
        })?;

        info!("SSO session cached at {}", self.path.display());
        Ok(())
    }

    /// Remove the record; a missing record is not an error
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Cleared SSO session cache {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ChipError::persistence(format!(
                "Failed to remove session cache {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    if dir.is_dir() {
        return Ok(());
    }
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_private_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(content)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(content)?;
    file.sync_all()
}
