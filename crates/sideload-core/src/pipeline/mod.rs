//! Signing request orchestration.
//!
//! A request moves through a fixed sequence of stages: resolve the input
//! package, resolve credentials, optionally modify the package, sign it,
//! read its metadata and write the install manifest. Every temporary file a
//! request creates is registered with its [`CleanupList`] and removed when the
//! request ends, whatever the outcome.

pub mod args;
pub mod cleanup;
pub mod executor;

pub use args::*;
pub use cleanup::*;
pub use executor::*;

use std::fmt;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::config::SideloadConfig;
use crate::error::{Result, SideloadError};
use crate::identity::UserId;
use crate::manifest::{build_manifest, install_link, manifest_file_name};
use crate::metadata::{AppMetadata, extract_metadata};
use crate::vault::CredentialVault;

/// Everything a caller supplies for one signing request.
#[derive(Debug, Default)]
pub struct SigningRequest {
    /// Uploaded package; the default package is used when absent.
    pub package: Option<PathBuf>,
    pub certificate: Option<PathBuf>,
    pub profile: Option<PathBuf>,
    pub password: Option<SecretString>,
    pub use_saved: bool,
    pub save: bool,
    pub modifications: ModificationOptions,
    /// Every file uploaded for this request.
    pub uploads: CleanupList,
}

/// How the signing identity for a request is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialMode {
    /// Load from the caller's vault entry.
    UseSaved,
    /// Store the uploaded credentials in the vault, then use them.
    SaveAndUse,
    /// Use the uploaded credentials once without storing them.
    Transient,
}

impl CredentialMode {
    /// Picks the mode from the two request flags. "Use saved" wins over "save".
    pub fn select(use_saved: bool, save: bool) -> Self {
        match (use_saved, save) {
            (true, _) => CredentialMode::UseSaved,
            (false, true) => CredentialMode::SaveAndUse,
            (false, false) => CredentialMode::Transient,
        }
    }

    fn touches_vault(self) -> bool {
        self != CredentialMode::Transient
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolveInput,
    ResolveCredentials,
    Modify,
    Sign,
    ExtractMetadata,
    WriteManifest,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ResolveInput => "resolve input",
            Stage::ResolveCredentials => "resolve credentials",
            Stage::Modify => "modify",
            Stage::Sign => "sign",
            Stage::ExtractMetadata => "extract metadata",
            Stage::WriteManifest => "write manifest",
        };
        f.write_str(name)
    }
}

/// Result of a completed request.
#[derive(Debug, Clone)]
pub struct SigningOutcome {
    pub suffix: String,
    pub signed_package: PathBuf,
    pub manifest_path: PathBuf,
    pub package_url: Url,
    pub manifest_url: Url,
    pub install_link: String,
    pub metadata: AppMetadata,
}

/// Credentials handed to the signing tool.
struct ResolvedCredentials {
    certificate: PathBuf,
    profile: PathBuf,
    password: Option<SecretString>,
}

/// Generates the suffix that namespaces a request's files.
pub fn request_suffix() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

/// Runs signing requests against shared configuration, vault and tool runner.
pub struct SigningPipeline<'a> {
    config: &'a SideloadConfig,
    vault: &'a CredentialVault,
    runner: &'a dyn ToolRunner,
}

impl<'a> SigningPipeline<'a> {
    pub fn new(config: &'a SideloadConfig, vault: &'a CredentialVault, runner: &'a dyn ToolRunner) -> Self {
        Self {
            config,
            vault,
            runner,
        }
    }

    /// Processes one request to completion or failure, then cleans up.
    pub async fn run(&self, user: &UserId, mut request: SigningRequest) -> Result<SigningOutcome> {
        let suffix = request_suffix();
        let mut cleanup = CleanupList::new();
        cleanup.absorb(std::mem::take(&mut request.uploads));

        let mode = CredentialMode::select(request.use_saved, request.save);
        tracing::info!(
            "Signing request {} for user {} ({:?}, package uploaded: {})",
            suffix,
            user,
            mode,
            request.package.is_some()
        );

        let result = self.execute(user, mode, request, &suffix, &mut cleanup).await;

        match &result {
            Ok(outcome) => tracing::info!("Request {} completed: {}", suffix, outcome.install_link),
            Err(e) => tracing::error!("Request {} failed: {}", suffix, e),
        }

        cleanup.drain(result.is_ok()).await;
        result
    }

    async fn execute(
        &self,
        user: &UserId,
        mode: CredentialMode,
        mut request: SigningRequest,
        suffix: &str,
        cleanup: &mut CleanupList,
    ) -> Result<SigningOutcome> {
        let dirs = &self.config.work_dirs;

        // Held until the signing tool has consumed the vault files.
        let _vault_guard = if mode.touches_vault() {
            Some(self.vault.lock(user).await)
        } else {
            None
        };

        log_stage(suffix, Stage::ResolveInput);
        let input = self.resolve_input(request.package.take(), suffix, cleanup).await?;

        log_stage(suffix, Stage::ResolveCredentials);
        let credentials = self
            .resolve_credentials(user, mode, &mut request, suffix, cleanup)
            .await?;

        log_stage(suffix, Stage::Modify);
        let modified = dirs.temp().join(format!("cyan_{}.ipa", suffix));
        let signing_input = match request.modifications.to_args(&input, &modified) {
            Some(args) => {
                cleanup.register(&modified);
                run_checked(self.runner, &self.config.tools.modifier, &args, &[]).await?;
                tracing::info!("Cyan modifications complete.");
                modified
            }
            None => {
                tracing::info!("No cyan modifications requested. Skipping...");
                input
            }
        };

        log_stage(suffix, Stage::Sign);
        let signed_name = format!("signed_{}.ipa", suffix);
        let signed = dirs.signed().join(&signed_name);
        cleanup.register_output(&signed);
        let signing_args = SigningArgs {
            certificate: &credentials.certificate,
            profile: Some(&credentials.profile),
            password: credentials.password.as_ref(),
            output: &signed,
            input: &signing_input,
        }
        .to_args();
        run_checked(
            self.runner,
            &self.config.tools.signer,
            &signing_args,
            SIGNER_SECRET_SWITCHES,
        )
        .await?;
        tracing::info!("Signed IPA created at: {}", signed.display());

        log_stage(suffix, Stage::ExtractMetadata);
        let signed_for_read = signed.clone();
        let (metadata, encoding) = tokio::task::spawn_blocking(move || extract_metadata(&signed_for_read))
            .await
            .map_err(|e| SideloadError::MetadataUnreadable(format!("metadata task failed: {}", e)))??;
        tracing::debug!("Parsed Info.plist ({:?} encoding): {:?}", encoding, metadata);

        log_stage(suffix, Stage::WriteManifest);
        let package_url = self.config.public_url(&format!("signed/{}", signed_name))?;
        let manifest = build_manifest(&package_url, &metadata, &self.config.branding_image_url)?;
        let manifest_name = manifest_file_name(&metadata.display_name, suffix);
        let manifest_path = dirs.manifests().join(&manifest_name);
        cleanup.register_output(&manifest_path);
        tokio::fs::write(&manifest_path, manifest).await?;
        tracing::info!("Generated manifest plist at: {}", manifest_path.display());

        let manifest_url = self.config.public_url(&format!("plist/{}", manifest_name))?;
        let install_link = install_link(&manifest_url);

        Ok(SigningOutcome {
            suffix: suffix.to_string(),
            signed_package: signed,
            manifest_path,
            package_url,
            manifest_url,
            install_link,
            metadata,
        })
    }

    async fn resolve_input(
        &self,
        upload: Option<PathBuf>,
        suffix: &str,
        cleanup: &mut CleanupList,
    ) -> Result<PathBuf> {
        match upload {
            Some(upload) => {
                let input = self
                    .config
                    .work_dirs
                    .temp()
                    .join(format!("input_{}.ipa", suffix));
                cleanup.register(&input);
                move_file(&upload, &input).await?;
                Ok(input)
            }
            None => {
                tracing::info!(
                    "No IPA uploaded. Using default IPA at: {}",
                    self.config.default_package.display()
                );
                Ok(self.config.default_package.clone())
            }
        }
    }

    async fn resolve_credentials(
        &self,
        user: &UserId,
        mode: CredentialMode,
        request: &mut SigningRequest,
        suffix: &str,
        cleanup: &mut CleanupList,
    ) -> Result<ResolvedCredentials> {
        let password = request
            .password
            .take()
            .filter(|p| !p.expose_secret().trim().is_empty());

        match mode {
            CredentialMode::UseSaved => {
                let saved = self.vault.load(user).await?;
                Ok(ResolvedCredentials {
                    certificate: saved.certificate,
                    profile: saved.profile,
                    password: saved.password,
                })
            }
            CredentialMode::SaveAndUse => {
                let (Some(certificate), Some(profile)) = (&request.certificate, &request.profile) else {
                    return Err(SideloadError::Validation(
                        "P12 and MobileProvision files are required to save certificates.".to_string(),
                    ));
                };
                let certificate = tokio::fs::read(certificate).await?;
                let profile = tokio::fs::read(profile).await?;
                let paths = self
                    .vault
                    .save(user, &certificate, &profile, password.as_ref())
                    .await?;
                Ok(ResolvedCredentials {
                    certificate: paths.certificate,
                    profile: paths.profile,
                    password,
                })
            }
            CredentialMode::Transient => {
                let (Some(certificate), Some(profile)) = (&request.certificate, &request.profile) else {
                    return Err(SideloadError::Validation(
                        "P12 and MobileProvision files are required.".to_string(),
                    ));
                };
                let dirs = &self.config.work_dirs;
                let cert_path = dirs.certificates().join(format!("cert_{}.p12", suffix));
                let profile_path = dirs.profiles().join(format!("app_{}.mobileprovision", suffix));
                cleanup.register(&cert_path);
                cleanup.register(&profile_path);
                move_file(certificate, &cert_path).await?;
                move_file(profile, &profile_path).await?;
                tracing::info!(
                    "Received temporary certificates: {}, {}",
                    cert_path.display(),
                    profile_path.display()
                );
                Ok(ResolvedCredentials {
                    certificate: cert_path,
                    profile: profile_path,
                    password,
                })
            }
        }
    }
}

fn log_stage(suffix: &str, stage: Stage) {
    tracing::debug!("Request {}: {}", suffix, stage);
}

/// Moves a file, copying across filesystems when a rename is not possible.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    if let Err(e) = tokio::fs::remove_file(from).await {
        tracing::warn!("Failed to remove {} after copy: {}", from.display(), e);
    }
    Ok(())
}
