//! Signing endpoint.
//!
//! Accepts the multipart upload form, streams files into the scratch
//! directory, runs the signing pipeline and redirects the browser to the
//! result page carrying the install link.

use std::path::{Path, PathBuf};

use axum::{
    Extension,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartError},
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use secrecy::SecretString;
use sideload_core::{
    SideloadError,
    identity::UserId,
    pipeline::{SigningRequest, request_suffix},
};
use tokio::io::AsyncWriteExt;

use crate::state::AppState;

/// Maximum request body size (2 GiB).
pub const MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;

/// Maximum number of injected components per request.
pub const MAX_TWEAKS: usize = 20;

/// File fields of the form and the extensions each accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadField {
    Package,
    Certificate,
    Profile,
    Icon,
    Tweak,
}

impl UploadField {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ipa" => Some(Self::Package),
            "p12" => Some(Self::Certificate),
            "mobileprovision" => Some(Self::Profile),
            "cyan_icon" => Some(Self::Icon),
            "cyan_tweaks" => Some(Self::Tweak),
            _ => None,
        }
    }

    fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            Self::Package => &["ipa"],
            Self::Certificate => &["p12"],
            Self::Profile => &["mobileprovision"],
            Self::Icon => &["png", "jpg", "jpeg"],
            Self::Tweak => &["deb", "dylib"],
        }
    }
}

/// Why reading the form failed.
#[derive(Debug)]
enum FormError {
    Multipart(MultipartError),
    Rejected(SideloadError),
}

impl From<MultipartError> for FormError {
    fn from(e: MultipartError) -> Self {
        FormError::Multipart(e)
    }
}

impl From<SideloadError> for FormError {
    fn from(e: SideloadError) -> Self {
        FormError::Rejected(e)
    }
}

impl From<std::io::Error> for FormError {
    fn from(e: std::io::Error) -> Self {
        FormError::Rejected(SideloadError::Io(e))
    }
}

impl IntoResponse for FormError {
    fn into_response(self) -> Response {
        match self {
            FormError::Multipart(e) => {
                let status = e.status();
                tracing::warn!("Rejected multipart upload ({}): {}", status, e.body_text());
                if status == StatusCode::PAYLOAD_TOO_LARGE {
                    (status, "Error: File too large. Max 2GB.").into_response()
                } else {
                    (status, format!("Error: {}", e.body_text())).into_response()
                }
            }
            FormError::Rejected(e) => error_response(&e),
        }
    }
}

/// POST /sign - Sign a package and redirect to the install page.
pub async fn sign(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    multipart: Multipart,
) -> Response {
    let mut request = SigningRequest::default();

    if let Err(e) = read_form(multipart, &state.config.work_dirs.temp(), &mut request).await {
        std::mem::take(&mut request.uploads).drain(false).await;
        return e.into_response();
    }

    match state.pipeline().run(&user, request).await {
        Ok(outcome) => match result_page(&state, &outcome.install_link) {
            Ok(page) => page.into_response(),
            Err(e) => error_response(&e),
        },
        Err(e) => error_response(&e),
    }
}

/// Reads every form field into `request`, registering each stored upload.
async fn read_form(
    mut multipart: Multipart,
    upload_dir: &Path,
    request: &mut SigningRequest,
) -> Result<(), FormError> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(kind) = UploadField::from_name(&name) {
            let Some(path) = store_upload(field, kind, upload_dir, request).await? else {
                continue;
            };
            let mods = &mut request.modifications;
            match kind {
                UploadField::Package => request.package = Some(path),
                UploadField::Certificate => request.certificate = Some(path),
                UploadField::Profile => request.profile = Some(path),
                UploadField::Icon => mods.icon = Some(path),
                UploadField::Tweak => {
                    if mods.inject.len() >= MAX_TWEAKS {
                        return Err(SideloadError::Validation(format!(
                            "Too many files for cyan_tweaks. Max {}.",
                            MAX_TWEAKS
                        ))
                        .into());
                    }
                    mods.inject.push(path);
                }
            }
            continue;
        }

        let value = field.text().await?;
        apply_text_field(request, &name, value)?;
    }

    Ok(())
}

/// Streams one file field to disk. Returns `None` for an empty file input.
async fn store_upload(
    mut field: Field<'_>,
    kind: UploadField,
    upload_dir: &Path,
    request: &mut SigningRequest,
) -> Result<Option<PathBuf>, FormError> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    if file_name.is_empty() {
        // Browsers submit an unnamed empty part for an untouched file input.
        while field.chunk().await?.is_some() {}
        return Ok(None);
    }

    let extension = Path::new(&file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let allowed = kind.allowed_extensions();
    if !allowed.contains(&extension.as_str()) {
        return Err(SideloadError::Validation(format!(
            "Invalid file type for {}: .{}. Allowed: {}",
            field.name().unwrap_or_default(),
            extension,
            allowed
                .iter()
                .map(|e| format!(".{}", e))
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .into());
    }

    let path = upload_dir.join(format!("upload_{}.{}", request_suffix(), extension));
    request.uploads.register(&path);

    let mut file = tokio::fs::File::create(&path).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    tracing::debug!("Stored upload {} ({} bytes) at {}", file_name, written, path.display());
    Ok(Some(path))
}

/// Applies a text field to the request. Unknown fields are ignored.
fn apply_text_field(request: &mut SigningRequest, name: &str, value: String) -> Result<(), SideloadError> {
    let mods = &mut request.modifications;
    match name {
        "p12_password" => request.password = Some(SecretString::from(value)),
        "use_saved_certs" => request.use_saved = is_checked(&value),
        "save_cert" => request.save = is_checked(&value),
        "cyan_name" => mods.name = Some(value),
        "cyan_version" => mods.version = Some(value),
        "cyan_bundle_id" => mods.bundle_id = Some(value),
        "cyan_minimum" => mods.minimum_os = Some(value),
        "cyan_remove_supported" => mods.remove_supported_devices = is_checked(&value),
        "cyan_no_watch" => mods.remove_watch_app = is_checked(&value),
        "cyan_enable_documents" => mods.enable_documents = is_checked(&value),
        "cyan_fakesign" => mods.fake_sign = is_checked(&value),
        "cyan_thin" => mods.thin = is_checked(&value),
        "cyan_remove_extensions" => mods.remove_extensions = is_checked(&value),
        "cyan_remove_encrypted" => mods.remove_encrypted = is_checked(&value),
        "cyan_ignore_encrypted" => mods.ignore_encrypted = is_checked(&value),
        "cyan_overwrite" => mods.overwrite = is_checked(&value),
        "cyan_compress_level" => mods.compress_level = parse_compress_level(&value)?,
        other => tracing::debug!("Ignoring unknown form field: {}", other),
    }
    Ok(())
}

fn is_checked(value: &str) -> bool {
    matches!(value.trim(), "on" | "true" | "1")
}

fn parse_compress_level(value: &str) -> Result<Option<u8>, SideloadError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<u8>() {
        Ok(level) if level <= 9 => Ok(Some(level)),
        _ => Err(SideloadError::Validation(format!(
            "Invalid compression level: {}. Expected 0-9.",
            value
        ))),
    }
}

/// Renders the redirect document pointing at the result page.
fn result_page(state: &AppState, install_link: &str) -> Result<Html<String>, SideloadError> {
    let mut result_url = state.config.public_url("result.html")?;
    result_url
        .query_pairs_mut()
        .append_pair("installLink", install_link);

    let href = result_url.as_str().replace('&', "&amp;").replace('"', "&quot;");
    Ok(Html(format!(
        "<!DOCTYPE html>\n<html>\n  <head>\n    <meta http-equiv=\"refresh\" content=\"0; url={}\">\n  </head>\n  <body></body>\n</html>\n",
        href
    )))
}

/// Maps a pipeline error to a plain-text response.
fn error_response(err: &SideloadError) -> Response {
    let (status, message) = match err {
        e if e.is_client_error() => (StatusCode::BAD_REQUEST, e.to_string()),
        SideloadError::ExternalTool { .. } | SideloadError::MetadataUnreadable(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        SideloadError::MalformedEnvelope | SideloadError::DecryptionFailure => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to read saved certificate password.".to_string(),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error.".to_string(),
        ),
    };

    if status.is_server_error() {
        tracing::error!("Signing request failed: {}", err);
    }

    (status, format!("Error: {}", message)).into_response()
}
