//! Shared access signature tokens
//!
//! DPS and IoT Hub both authenticate REST calls with a token of the form
//! `SharedAccessSignature sr=<resource>&sig=<signature>&se=<expiry>[&skn=<policy>]`
//! where the signature is the HMAC-SHA256 of `"<encoded resource>\n<expiry>"`.

use chrono::Utc;
use std::fmt;

use crate::keys::{sign, KeyError};

/// Default token lifetime in seconds
pub const DEFAULT_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasToken {
    /// URL-encoded resource URI
    resource: String,
    /// URL-encoded base64 signature
    signature: String,
    /// Unix timestamp (seconds) after which the token is rejected
    expiry: i64,
    /// Access policy name, for policy-scoped keys
    policy: Option<String>,
}

impl SasToken {
    /// Sign `resource` with a base64 key, expiring at `expiry` (Unix seconds)
    pub fn generate(
        resource: &str,
        key: &str,
        policy: Option<&str>,
        expiry: i64,
    ) -> Result<Self, KeyError> {
        let resource = urlencoding::encode(resource).into_owned();
        let to_sign = format!("{}\n{}", resource, expiry);
        let signature = sign(key, to_sign.as_bytes())?;

        Ok(Self {
            resource,
            signature: urlencoding::encode(&signature).into_owned(),
            expiry,
            policy: policy.map(str::to_string),
        })
    }

    /// Sign `resource`, expiring `ttl_secs` from now
    pub fn with_ttl(
        resource: &str,
        key: &str,
        policy: Option<&str>,
        ttl_secs: u64,
    ) -> Result<Self, KeyError> {
        let expiry = expiry_after(Utc::now().timestamp(), ttl_secs)?;
        Self::generate(resource, key, policy, expiry)
    }

    pub fn expiry(&self) -> i64 {
        self.expiry
    }
}

fn expiry_after(now: i64, ttl_secs: u64) -> Result<i64, KeyError> {
    i64::try_from(ttl_secs)
        .ok()
        .and_then(|ttl| now.checked_add(ttl))
        .ok_or(KeyError::TtlOutOfRange(ttl_secs))
}

impl fmt::Display for SasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SharedAccessSignature sr={}&sig={}&se={}",
            self.resource, self.signature, self.expiry
        )?;
        if let Some(policy) = &self.policy {
            write!(f, "&skn={}", policy)?;
        }
        Ok(())
    }
}
