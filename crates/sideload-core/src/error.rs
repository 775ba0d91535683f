//! Error types for the sideload core library.

use thiserror::Error;

/// Core error type for the signing pipeline and credential vault.
#[derive(Error, Debug)]
pub enum SideloadError {
    #[error("{0}")]
    Validation(String),

    #[error("No saved certificates found. Please upload your P12 and MobileProvision files.")]
    VaultMiss,

    #[error("{tool} failed with {}: {stderr}", describe_status(.status))]
    ExternalTool {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Failed to read Info.plist from the signed IPA: {0}")]
    MetadataUnreadable(String),

    #[error("Malformed credential envelope")]
    MalformedEnvelope,

    #[error("Credential decryption failed")]
    DecryptionFailure,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SideloadError {
    /// Whether the failure was caused by the caller's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SideloadError::Validation(_) | SideloadError::VaultMiss)
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit code {}", code),
        None => "no exit status".to_string(),
    }
}

/// Result type alias for sideload operations.
pub type Result<T> = std::result::Result<T, SideloadError>;
