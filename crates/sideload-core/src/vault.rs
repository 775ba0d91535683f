//! Per-user credential vault.
//!
//! Each identity owns one directory under the vault root holding a p12
//! certificate, a provisioning profile and an optional sealed password:
//!
//! ```text
//! users/<user-id>/cert.p12
//! users/<user-id>/app.mobileprovision
//! users/<user-id>/password.enc
//! ```
//!
//! An entry with only one of the two blobs is treated as absent. Saves are not
//! atomic as a group, so a crash mid-save leaves a partial entry that the next
//! save overwrites.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::crypto::CredentialCipher;
use crate::error::{Result, SideloadError};
use crate::identity::UserId;

const CERTIFICATE_FILE: &str = "cert.p12";
const PROFILE_FILE: &str = "app.mobileprovision";
const PASSWORD_FILE: &str = "password.enc";

/// Paths of one identity's vault entry.
#[derive(Debug, Clone)]
pub struct VaultPaths {
    pub dir: PathBuf,
    pub certificate: PathBuf,
    pub profile: PathBuf,
    pub password: PathBuf,
}

/// Credentials resolved from the vault.
#[derive(Debug)]
pub struct VaultCredentials {
    pub certificate: PathBuf,
    pub profile: PathBuf,
    pub password: Option<SecretString>,
}

/// Encrypted per-identity credential storage.
pub struct CredentialVault {
    root: PathBuf,
    cipher: CredentialCipher,
    locks: Arc<LockMap>,
}

type LockMap = DashMap<UserId, Arc<Mutex<()>>>;

/// Exclusive access to one identity's vault entry.
///
/// The identity's lock entry is dropped from the map on release once no
/// other request holds or waits for it.
#[derive(Debug)]
pub struct VaultGuard {
    guard: Option<OwnedMutexGuard<()>>,
    user: UserId,
    locks: Arc<LockMap>,
}

impl Drop for VaultGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.user, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl CredentialVault {
    pub fn new(root: impl Into<PathBuf>, cipher: CredentialCipher) -> Self {
        Self {
            root: root.into(),
            cipher,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn paths(&self, user: &UserId) -> VaultPaths {
        let dir = self.root.join(user.as_str());
        VaultPaths {
            certificate: dir.join(CERTIFICATE_FILE),
            profile: dir.join(PROFILE_FILE),
            password: dir.join(PASSWORD_FILE),
            dir,
        }
    }

    /// Serializes vault use for one identity.
    ///
    /// Callers that read or write an entry and then hand its paths to an
    /// external tool hold the guard until the tool has finished.
    pub async fn lock(&self, user: &UserId) -> VaultGuard {
        let lock = self
            .locks
            .entry(user.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        VaultGuard {
            guard: Some(lock.lock_owned().await),
            user: user.clone(),
            locks: self.locks.clone(),
        }
    }

    /// Returns true only if both the certificate and the profile are present.
    pub async fn exists(&self, user: &UserId) -> Result<bool> {
        let paths = self.paths(user);
        Ok(tokio::fs::try_exists(&paths.certificate).await?
            && tokio::fs::try_exists(&paths.profile).await?)
    }

    /// Writes (or overwrites) an identity's credentials.
    ///
    /// Without a password any previously saved password is removed.
    pub async fn save(
        &self,
        user: &UserId,
        certificate: &[u8],
        profile: &[u8],
        password: Option<&SecretString>,
    ) -> Result<VaultPaths> {
        let paths = self.paths(user);

        if !tokio::fs::try_exists(&paths.dir).await? {
            tokio::fs::create_dir_all(&paths.dir).await?;
            tracing::info!("Created user directory: {}", paths.dir.display());
        }

        tokio::fs::write(&paths.certificate, certificate).await?;
        tokio::fs::write(&paths.profile, profile).await?;
        tracing::info!("Saved certificates for user ID: {}", user);

        match password.map(|p| p.expose_secret()).filter(|p| !p.trim().is_empty()) {
            Some(password) => {
                let envelope = self.cipher.seal(password)?;
                tokio::fs::write(&paths.password, envelope).await?;
                tracing::info!("Saved encrypted password for user ID: {}", user);
            }
            None => {
                remove_if_present(&paths.password).await?;
                tracing::info!("Certificates saved without a password for user ID: {}", user);
            }
        }

        Ok(paths)
    }

    /// Resolves an identity's saved credentials, decrypting the password if any.
    pub async fn load(&self, user: &UserId) -> Result<VaultCredentials> {
        if !self.exists(user).await? {
            tracing::info!("No saved certificates found for user ID: {}", user);
            return Err(SideloadError::VaultMiss);
        }

        let paths = self.paths(user);
        let password = match tokio::fs::read_to_string(&paths.password).await {
            Ok(envelope) => Some(SecretString::from(self.cipher.open(&envelope)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            "Using saved certificates {} a password for user ID: {}",
            if password.is_some() { "with" } else { "WITHOUT" },
            user
        );

        Ok(VaultCredentials {
            certificate: paths.certificate,
            profile: paths.profile,
            password,
        })
    }
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
