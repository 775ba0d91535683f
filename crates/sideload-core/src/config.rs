//! Process-wide configuration, loaded once at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::crypto::EncryptionKey;
use crate::error::{Result, SideloadError};

/// Default image shown by iOS while an OTA install is in progress.
pub const DEFAULT_BRANDING_IMAGE_URL: &str =
    "https://raw.githubusercontent.com/daisuke1227/RevengeUpdates/refs/heads/main/WSF.png";

/// Layout of the writable working-storage root.
#[derive(Debug, Clone)]
pub struct WorkDirs {
    root: PathBuf,
}

impl WorkDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Uploaded transient certificates.
    pub fn certificates(&self) -> PathBuf {
        self.root.join("p12")
    }

    /// Uploaded transient provisioning profiles.
    pub fn profiles(&self) -> PathBuf {
        self.root.join("mp")
    }

    /// Request-scoped scratch files.
    pub fn temp(&self) -> PathBuf {
        self.root.join("temp")
    }

    /// Signed packages served for download.
    pub fn signed(&self) -> PathBuf {
        self.root.join("signed")
    }

    /// Generated install manifests.
    pub fn manifests(&self) -> PathBuf {
        self.root.join("plist")
    }

    /// Per-user credential vault entries.
    pub fn users(&self) -> PathBuf {
        self.root.join("users")
    }

    /// Directories subject to the retention sweep. The vault is not swept.
    pub fn swept(&self) -> Vec<PathBuf> {
        vec![
            self.profiles(),
            self.certificates(),
            self.manifests(),
            self.temp(),
            self.signed(),
        ]
    }

    /// Creates every working subdirectory that does not yet exist.
    pub async fn ensure_all(&self) -> Result<()> {
        let mut all = self.swept();
        all.push(self.users());
        for dir in all {
            if !tokio::fs::try_exists(&dir).await? {
                tokio::fs::create_dir_all(&dir).await?;
                tracing::info!("Created directory: {}", dir.display());
            }
        }
        Ok(())
    }
}

/// Locations of the external tools.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    /// Modification tool (cyan).
    pub modifier: String,
    /// Signing tool (zsign).
    pub signer: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            modifier: "cyan".to_string(),
            signer: "zsign".to_string(),
        }
    }
}

/// How long shared working files live, and how often they are swept.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    pub interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(30 * 60),
            interval: Duration::from_secs(30 * 60),
        }
    }
}

/// Immutable configuration shared by every component.
#[derive(Debug, Clone)]
pub struct SideloadConfig {
    /// Public base URL used to build absolute links. Always ends with `/`.
    pub base_url: Url,
    pub work_dirs: WorkDirs,
    pub encryption_key: EncryptionKey,
    /// Package signed when the caller uploads none.
    pub default_package: PathBuf,
    pub tools: ToolPaths,
    pub retention: RetentionPolicy,
    pub branding_image_url: String,
}

impl SideloadConfig {
    /// Loads configuration from environment variables.
    ///
    /// `SIDELOAD_BASE_URL`, `SIDELOAD_WORK_DIR`, `ENCRYPTION_KEY` and
    /// `SIDELOAD_DEFAULT_IPA` are required.
    pub fn from_env() -> Result<Self> {
        let base_url = normalize_base_url(&required_var("SIDELOAD_BASE_URL")?)?;
        let work_dir = required_var("SIDELOAD_WORK_DIR")?;
        let encryption_key = EncryptionKey::from_env()?;
        let default_package = PathBuf::from(required_var("SIDELOAD_DEFAULT_IPA")?);

        let mut tools = ToolPaths::default();
        if let Some(val) = optional_var("SIDELOAD_CYAN_BIN") {
            tools.modifier = val;
        }
        if let Some(val) = optional_var("SIDELOAD_ZSIGN_BIN") {
            tools.signer = val;
        }

        let mut retention = RetentionPolicy::default();
        if let Some(minutes) = minutes_var("SIDELOAD_RETENTION_MINUTES")? {
            retention.max_age = minutes;
        }
        if let Some(minutes) = minutes_var("SIDELOAD_SWEEP_INTERVAL_MINUTES")? {
            retention.interval = minutes;
        }

        Ok(Self {
            base_url,
            work_dirs: WorkDirs::new(work_dir),
            encryption_key,
            default_package,
            tools,
            retention,
            branding_image_url: optional_var("SIDELOAD_BRANDING_IMAGE_URL")
                .unwrap_or_else(|| DEFAULT_BRANDING_IMAGE_URL.to_string()),
        })
    }

    /// Checks filesystem preconditions and creates the working directories.
    pub async fn prepare(&self) -> Result<()> {
        if !tokio::fs::try_exists(&self.default_package).await? {
            return Err(SideloadError::Configuration(format!(
                "Default IPA not found at path: {}",
                self.default_package.display()
            )));
        }
        self.work_dirs.ensure_all().await
    }

    /// Absolute public URL for a file under the base URL.
    pub fn public_url(&self, relative: &str) -> Result<Url> {
        self.base_url.join(relative).map_err(|e| {
            SideloadError::Configuration(format!("Cannot build URL for {}: {}", relative, e))
        })
    }
}

/// Parses the base URL and makes sure relative joins append to its path.
pub fn normalize_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| SideloadError::Configuration(format!("Invalid SIDELOAD_BASE_URL: {}", e)))?;

    if url.cannot_be_a_base() {
        return Err(SideloadError::Configuration(
            "SIDELOAD_BASE_URL must be an absolute http(s) URL".to_string(),
        ));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name).ok_or_else(|| {
        SideloadError::Configuration(format!("{} environment variable is required", name))
    })
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn minutes_var(name: &str) -> Result<Option<Duration>> {
    match optional_var(name) {
        Some(val) => {
            let seconds = val
                .parse::<u64>()
                .ok()
                .filter(|minutes| *minutes > 0)
                .and_then(|minutes| minutes.checked_mul(60))
                .ok_or_else(|| {
                    SideloadError::Configuration(format!(
                        "{} must be a positive whole number of minutes",
                        name
                    ))
                })?;
            Ok(Some(Duration::from_secs(seconds)))
        }
        None => Ok(None),
    }
}
