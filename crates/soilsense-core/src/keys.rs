//! Per-device symmetric key derivation
//!
//! Devices enrolled through a DPS group enrollment do not carry their own
//! secret. Each device key is the HMAC-SHA256 of the registration ID, keyed
//! with the decoded group enrollment key, and is recomputed on every run.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid key encoding: {0}")]
    InvalidKeyEncoding(String),
    #[error("Token lifetime of {0}s is out of range")]
    TtlOutOfRange(u64),
}

/// Base64-encoded symmetric key for a single device
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKey(String);

impl DerivedKey {
    /// Wrap an already-encoded key (e.g. one taken from a connection string)
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

/// Sign `message` with a base64-encoded key, returning the base64 digest
pub fn sign(key: &str, message: &[u8]) -> Result<String, KeyError> {
    let raw = STANDARD
        .decode(key.trim())
        .map_err(|e| KeyError::InvalidKeyEncoding(e.to_string()))?;

    let mut mac = HmacSha256::new_from_slice(&raw)
        .map_err(|e| KeyError::InvalidKeyEncoding(e.to_string()))?;
    mac.update(message);

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Derive the symmetric key for `device_id` from the group enrollment key
pub fn derive_device_key(device_id: &str, group_key: &str) -> Result<DerivedKey, KeyError> {
    sign(group_key, device_id.as_bytes()).map(DerivedKey)
}
