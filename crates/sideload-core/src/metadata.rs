//! Signed package metadata extraction.
//!
//! Reads `Payload/<App>.app/Info.plist` out of an `.ipa` archive. The
//! descriptor is parsed as an XML property list first and as a binary
//! property list if that fails.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::OnceLock;

use regex_lite::Regex;

use crate::error::{Result, SideloadError};

pub const DEFAULT_BUNDLE_ID: &str = "com.example.unknown";
pub const DEFAULT_BUNDLE_VERSION: &str = "1.0.0";
pub const DEFAULT_DISPLAY_NAME: &str = "App";

/// Upper bound on the buffer reserved up front for `Info.plist`.
const MAX_DESCRIPTOR_PREALLOC: u64 = 1 << 20;

/// Fields of the application descriptor needed to build a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppMetadata {
    pub bundle_id: String,
    pub bundle_version: String,
    pub display_name: String,
}

impl AppMetadata {
    /// Reads the three fields from a parsed descriptor, applying defaults.
    pub fn from_dictionary(dict: &plist::Dictionary) -> Self {
        let string = |key: &str| {
            dict.get(key)
                .and_then(|v| v.as_string())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            bundle_id: string("CFBundleIdentifier").unwrap_or_else(|| DEFAULT_BUNDLE_ID.to_string()),
            bundle_version: string("CFBundleVersion")
                .unwrap_or_else(|| DEFAULT_BUNDLE_VERSION.to_string()),
            display_name: string("CFBundleDisplayName")
                .or_else(|| string("CFBundleName"))
                .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
        }
    }
}

/// Property list encoding that successfully parsed a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlistEncoding {
    Xml,
    Binary,
}

fn descriptor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^Payload/[^/]+\.app/Info\.plist$").expect("descriptor pattern is valid")
    })
}

/// Extracts app metadata from a signed package.
pub fn extract_metadata(package: &Path) -> Result<(AppMetadata, PlistEncoding)> {
    let bytes = read_descriptor(package)?;
    let (dict, encoding) = parse_descriptor(&bytes)?;
    Ok((AppMetadata::from_dictionary(&dict), encoding))
}

/// Returns the raw bytes of the application's `Info.plist`.
pub fn read_descriptor(package: &Path) -> Result<Vec<u8>> {
    let file = File::open(package).map_err(|e| {
        SideloadError::MetadataUnreadable(format!("cannot open {}: {}", package.display(), e))
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| SideloadError::MetadataUnreadable(format!("not a zip archive: {}", e)))?;

    let pattern = descriptor_pattern();
    let index = (0..archive.len())
        .find(|&i| {
            archive
                .by_index(i)
                .map(|entry| pattern.is_match(entry.name()))
                .unwrap_or(false)
        })
        .ok_or_else(|| {
            SideloadError::MetadataUnreadable("Couldn't find Info.plist in the signed IPA".to_string())
        })?;

    let mut entry = archive
        .by_index(index)
        .map_err(|e| SideloadError::MetadataUnreadable(e.to_string()))?;
    let mut bytes = Vec::with_capacity(descriptor_capacity(entry.size()));
    entry
        .read_to_end(&mut bytes)
        .map_err(|e| SideloadError::MetadataUnreadable(format!("cannot read Info.plist: {}", e)))?;
    Ok(bytes)
}

/// Initial buffer size for a descriptor whose archive header claims `declared`
/// bytes. The header is untrusted, so the reservation is capped.
fn descriptor_capacity(declared: u64) -> usize {
    declared.min(MAX_DESCRIPTOR_PREALLOC) as usize
}

/// Parses descriptor bytes, trying the XML encoding before the binary one.
pub fn parse_descriptor(bytes: &[u8]) -> Result<(plist::Dictionary, PlistEncoding)> {
    let xml_err = match plist::Value::from_reader_xml(Cursor::new(bytes)) {
        Ok(value) => return into_dictionary(value).map(|d| (d, PlistEncoding::Xml)),
        Err(e) => e,
    };

    tracing::debug!("Info.plist is not XML ({}), trying binary encoding", xml_err);

    if !bytes.starts_with(b"bplist") {
        return Err(SideloadError::MetadataUnreadable(format!(
            "Failed to parse Info.plist: {}",
            xml_err
        )));
    }

    let value = plist::Value::from_reader(Cursor::new(bytes)).map_err(|e| {
        SideloadError::MetadataUnreadable(format!("Failed to parse Info.plist: {}", e))
    })?;
    into_dictionary(value).map(|d| (d, PlistEncoding::Binary))
}

fn into_dictionary(value: plist::Value) -> Result<plist::Dictionary> {
    value
        .into_dictionary()
        .ok_or_else(|| SideloadError::MetadataUnreadable("Info.plist is not a dictionary".to_string()))
}
