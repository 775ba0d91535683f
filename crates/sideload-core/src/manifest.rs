//! OTA install manifest generation.

use plist::{Dictionary, Value};
use url::Url;

use crate::error::{Result, SideloadError};
use crate::metadata::AppMetadata;

/// Scheme iOS uses to start an over-the-air install.
const INSTALL_LINK_PREFIX: &str = "itms-services://?action=download-manifest&url=";

/// Renders the manifest plist for one signed package.
///
/// Strings are escaped by the plist writer, so display names containing
/// markup characters still produce a well-formed document.
pub fn build_manifest(package_url: &Url, metadata: &AppMetadata, image_url: &str) -> Result<Vec<u8>> {
    let mut metadata_dict = Dictionary::new();
    metadata_dict.insert(
        "bundle-identifier".to_string(),
        Value::String(metadata.bundle_id.clone()),
    );
    metadata_dict.insert(
        "bundle-version".to_string(),
        Value::String(metadata.bundle_version.clone()),
    );
    metadata_dict.insert("kind".to_string(), Value::String("software".to_string()));
    metadata_dict.insert("title".to_string(), Value::String(metadata.display_name.clone()));

    let assets = vec![
        asset("software-package", package_url.as_str(), None),
        asset("display-image", image_url, Some(false)),
        asset("full-size-image", image_url, Some(false)),
    ];

    let mut item = Dictionary::new();
    item.insert("assets".to_string(), Value::Array(assets));
    item.insert("metadata".to_string(), Value::Dictionary(metadata_dict));

    let mut root = Dictionary::new();
    root.insert(
        "items".to_string(),
        Value::Array(vec![Value::Dictionary(item)]),
    );

    let mut out = Vec::new();
    Value::Dictionary(root)
        .to_writer_xml(&mut out)
        .map_err(|e| SideloadError::Io(std::io::Error::other(format!("Failed to render manifest: {}", e))))?;
    Ok(out)
}

fn asset(kind: &str, url: &str, needs_shine: Option<bool>) -> Value {
    let mut dict = Dictionary::new();
    dict.insert("kind".to_string(), Value::String(kind.to_string()));
    if let Some(shine) = needs_shine {
        dict.insert("needs-shine".to_string(), Value::Boolean(shine));
    }
    dict.insert("url".to_string(), Value::String(url.to_string()));
    Value::Dictionary(dict)
}

/// Strips everything outside `[A-Za-z0-9_-]`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// File name under which a request's manifest is stored.
pub fn manifest_file_name(display_name: &str, suffix: &str) -> String {
    format!("{}_{}.plist", sanitize_filename(display_name), suffix)
}

/// Builds the `itms-services` link pointing at a manifest URL.
pub fn install_link(manifest_url: &Url) -> String {
    format!(
        "{}{}",
        INSTALL_LINK_PREFIX,
        urlencoding::encode(manifest_url.as_str())
    )
}
