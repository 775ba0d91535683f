//! Anonymous per-browser identities.
//!
//! A [`UserId`] is an opaque random token used only to key the credential
//! vault. It carries no authentication: whoever presents a token can read and
//! overwrite that identity's saved credentials.

use std::fmt;

use rand::RngCore;

/// Number of random bytes in a generated identity.
const USER_ID_BYTES: usize = 16;

/// An opaque identity token (32 lowercase hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    /// Generates a new cryptographically random identity.
    pub fn generate() -> Self {
        let mut bytes = [0u8; USER_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Accepts a client-presented token if it has the shape of a generated one.
    ///
    /// The token names a directory under the vault root, so anything other than
    /// lowercase hex of the expected length is refused.
    pub fn parse(token: &str) -> Option<Self> {
        let valid = token.len() == USER_ID_BYTES * 2
            && token
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        valid.then(|| Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
