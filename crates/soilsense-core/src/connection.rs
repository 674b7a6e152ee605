//! IoT Hub connection strings
//!
//! Two shapes are in use:
//! - device: `HostName=<hub>;DeviceId=<id>;SharedAccessKey=<key>`
//! - service (hub-level): `HostName=<hub>;SharedAccessKeyName=<policy>;SharedAccessKey=<key>`

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::keys::DerivedKey;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStringError {
    #[error("Connection string is missing {0}")]
    MissingField(&'static str),
    #[error("Malformed connection string segment: {0}")]
    Malformed(String),
}

/// Parsed connection string
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub host_name: String,
    pub device_id: Option<String>,
    pub shared_access_key_name: Option<String>,
    pub shared_access_key: String,
}

impl ConnectionString {
    /// Device connection string for a hub assignment
    pub fn device(host_name: &str, device_id: &str, key: &DerivedKey) -> Self {
        Self {
            host_name: host_name.to_string(),
            device_id: Some(device_id.to_string()),
            shared_access_key_name: None,
            shared_access_key: key.as_str().to_string(),
        }
    }

    /// The string with the key masked, safe to log
    pub fn redacted(&self) -> String {
        let mut masked = self.clone();
        masked.shared_access_key = "***".to_string();
        masked.to_string()
    }
}

impl FromStr for ConnectionString {
    type Err = ConnectionStringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut host_name = None;
        let mut device_id = None;
        let mut key_name = None;
        let mut key = None;

        for segment in s.trim().split(';').filter(|seg| !seg.trim().is_empty()) {
            // Keys are base64 and may end in '=', so only split on the first one
            let (name, value) = segment
                .split_once('=')
                .ok_or_else(|| ConnectionStringError::Malformed(segment.to_string()))?;
            let value = value.trim().to_string();

            match name.trim() {
                "HostName" => host_name = Some(value),
                "DeviceId" => device_id = Some(value),
                "SharedAccessKeyName" => key_name = Some(value),
                "SharedAccessKey" => key = Some(value),
                _ => {}
            }
        }

        Ok(Self {
            host_name: host_name.ok_or(ConnectionStringError::MissingField("HostName"))?,
            device_id,
            shared_access_key_name: key_name,
            shared_access_key: key.ok_or(ConnectionStringError::MissingField("SharedAccessKey"))?,
        })
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostName={}", self.host_name)?;
        if let Some(device_id) = &self.device_id {
            write!(f, ";DeviceId={}", device_id)?;
        }
        if let Some(key_name) = &self.shared_access_key_name {
            write!(f, ";SharedAccessKeyName={}", key_name)?;
        }
        write!(f, ";SharedAccessKey={}", self.shared_access_key)
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionString({})", self.redacted())
    }
}
