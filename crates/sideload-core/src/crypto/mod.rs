//! Credential encryption for vault-stored certificate passwords.
//!
//! Passwords are sealed with AES-256-GCM under a single process-wide key and
//! stored as a text envelope: `hex(nonce):hex(ciphertext)`.

use std::sync::Arc;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{Result, SideloadError};

/// Length of the AES-GCM nonce in bytes.
const NONCE_LEN: usize = 12;

/// Separator between the nonce and ciphertext parts of an envelope.
const ENVELOPE_SEPARATOR: char = ':';

/// A 256-bit encryption key, shared cheaply between components.
#[derive(Clone)]
pub struct EncryptionKey(Arc<[u8; 32]>);

impl EncryptionKey {
    /// Loads the key from the `ENCRYPTION_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let key_str = std::env::var("ENCRYPTION_KEY").map_err(|_| {
            SideloadError::Configuration(
                "ENCRYPTION_KEY environment variable is required".to_string(),
            )
        })?;

        Self::from_hex(&key_str)
    }

    /// Creates a key from a 64-character hex string.
    pub fn from_hex(key_str: &str) -> Result<Self> {
        let key_bytes = hex::decode(key_str.trim()).map_err(|e| {
            SideloadError::Configuration(format!("ENCRYPTION_KEY is not valid hex: {}", e))
        })?;

        if key_bytes.len() != 32 {
            return Err(SideloadError::Configuration(format!(
                "ENCRYPTION_KEY must be exactly 32 bytes, got {}",
                key_bytes.len()
            )));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);
        Ok(Self(Arc::new(key)))
    }

    /// Generates a fresh random key.
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self(Arc::new(key))
    }

    /// Returns the key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

/// Seals and opens short secrets such as p12 passwords.
#[derive(Debug, Clone)]
pub struct CredentialCipher {
    key: EncryptionKey,
}

impl CredentialCipher {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Encrypts `plaintext` under a fresh random nonce and returns the envelope text.
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| SideloadError::Encryption(format!("Encryption failed: {}", e)))?;

        Ok(format!(
            "{}{}{}",
            hex::encode(nonce_bytes),
            ENVELOPE_SEPARATOR,
            hex::encode(ciphertext)
        ))
    }

    /// Decrypts an envelope produced by [`CredentialCipher::seal`].
    pub fn open(&self, envelope: &str) -> Result<String> {
        let parts: Vec<&str> = envelope.trim().split(ENVELOPE_SEPARATOR).collect();
        if parts.len() != 2 {
            return Err(SideloadError::MalformedEnvelope);
        }

        let nonce_bytes = hex::decode(parts[0]).map_err(|_| SideloadError::MalformedEnvelope)?;
        let ciphertext = hex::decode(parts[1]).map_err(|_| SideloadError::MalformedEnvelope)?;

        if nonce_bytes.len() != NONCE_LEN {
            return Err(SideloadError::MalformedEnvelope);
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()));
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
                .map_err(|_| SideloadError::DecryptionFailure)?,
        );

        std::str::from_utf8(&plaintext)
            .map(str::to_owned)
            .map_err(|_| SideloadError::DecryptionFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> EncryptionKey {
        EncryptionKey::from_hex(&"ab".repeat(32)).unwrap()
    }

    #[test]
    fn test_key_from_hex_valid() {
        let key = test_key();
        assert_eq!(key.as_bytes(), &[0xab; 32]);
    }

    #[test]
    fn test_key_from_hex_wrong_length() {
        let result = EncryptionKey::from_hex("abcd");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("32 bytes"));
    }

    #[test]
    fn test_key_from_hex_invalid_chars() {
        let result = EncryptionKey::from_hex(&"zz".repeat(32));
        assert!(matches!(result, Err(SideloadError::Configuration(_))));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        assert_eq!(format!("{:?}", test_key()), "EncryptionKey([REDACTED])");
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = CredentialCipher::new(test_key());
        let envelope = cipher.seal("hunter2").unwrap();

        assert_eq!(cipher.open(&envelope).unwrap(), "hunter2");
    }

    #[test]
    fn test_seal_uses_fresh_nonce() {
        let cipher = CredentialCipher::new(test_key());
        let first = cipher.seal("p12-password").unwrap();
        let second = cipher.seal("p12-password").unwrap();

        assert_ne!(first, second);
        assert_eq!(cipher.open(&first).unwrap(), "p12-password");
        assert_eq!(cipher.open(&second).unwrap(), "p12-password");
    }

    #[test]
    fn test_envelope_format() {
        let cipher = CredentialCipher::new(test_key());
        let envelope = cipher.seal("x").unwrap();
        let (nonce, ciphertext) = envelope.split_once(':').unwrap();

        assert_eq!(nonce.len(), NONCE_LEN * 2);
        assert!(hex::decode(ciphertext).is_ok());
    }

    #[test]
    fn test_open_without_separator_is_malformed() {
        let cipher = CredentialCipher::new(test_key());
        let result = cipher.open("deadbeefdeadbeef");
        assert!(matches!(result, Err(SideloadError::MalformedEnvelope)));
    }

    #[test]
    fn test_open_with_extra_parts_is_malformed() {
        let cipher = CredentialCipher::new(test_key());
        let result = cipher.open("aa:bb:cc");
        assert!(matches!(result, Err(SideloadError::MalformedEnvelope)));
    }

    #[test]
    fn test_open_with_short_nonce_is_malformed() {
        let cipher = CredentialCipher::new(test_key());
        let result = cipher.open("abcd:abcdef");
        assert!(matches!(result, Err(SideloadError::MalformedEnvelope)));
    }

    #[test]
    fn test_open_under_different_key_fails() {
        let sealed = CredentialCipher::new(test_key()).seal("secret").unwrap();
        let other = CredentialCipher::new(EncryptionKey::generate());

        assert!(matches!(
            other.open(&sealed),
            Err(SideloadError::DecryptionFailure)
        ));
    }

    #[test]
    fn test_open_tampered_ciphertext_fails() {
        let cipher = CredentialCipher::new(test_key());
        let envelope = cipher.seal("secret").unwrap();
        let (nonce, ciphertext) = envelope.split_once(':').unwrap();
        let mut bytes = hex::decode(ciphertext).unwrap();
        bytes[0] ^= 0xff;
        let tampered = format!("{}:{}", nonce, hex::encode(bytes));

        assert!(matches!(
            cipher.open(&tampered),
            Err(SideloadError::DecryptionFailure)
        ));
    }
}
