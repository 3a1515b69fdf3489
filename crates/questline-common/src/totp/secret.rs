//! Per-code TOTP secrets.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::base32::ALPHABET;

/// Base32 secret owned by a mission code.
///
/// Serialized as plain text for the store. `Debug` is redacted so secrets
/// never end up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap an already-stored secret. No validation happens here; a corrupt
    /// value surfaces as `OtpError::InvalidSecret` when a code is computed.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(**redacted**)")
    }
}

impl AsRef<str> for Secret {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generate a fresh secret of `length` Base32 symbols.
///
/// Symbols are drawn uniformly from the thread-local CSPRNG, which is seeded
/// from the OS. If the OS source is unavailable the RNG panics rather than
/// degrading.
pub fn generate_secret(length: usize) -> Secret {
    let mut rng = rand::rng();
    let secret: String = (0..length)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    Secret(secret)
}
