//! IoT Hub identity registry lookups
//!
//! Only used to check whether a device identity exists. The registry never
//! hands back device secrets, so a hit here cannot be turned into a
//! connection string.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Deserialize;
use soilsense_core::{ConnectionString, ConnectionStringError, KeyError, SasToken};
use thiserror::Error;
use tracing::debug;

use crate::http::{bare_host, base_url};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Registry returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid hub connection string: {0}")]
    ConnectionString(#[from] ConnectionStringError),
    #[error("Failed to sign registry request: {0}")]
    Signing(#[from] KeyError),
}

/// Subset of the registry's device identity we care about
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Looks up device identities in a hub
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// `Ok(None)` when the hub does not know the device
    async fn get_device(&self, device_id: &str) -> Result<Option<DeviceRecord>, RegistryError>;
}

/// Registry client authenticated with a hub-level (service) connection string
pub struct HubRegistryClient {
    client: reqwest::Client,
    connection: ConnectionString,
    api_version: String,
    sas_ttl_secs: u64,
}

impl HubRegistryClient {
    pub fn new(
        client: reqwest::Client,
        hub_connection_string: &str,
        api_version: impl Into<String>,
        sas_ttl_secs: u64,
    ) -> Result<Self, RegistryError> {
        let connection: ConnectionString = hub_connection_string.parse()?;
        if connection.shared_access_key_name.is_none() {
            return Err(ConnectionStringError::MissingField("SharedAccessKeyName").into());
        }

        Ok(Self {
            client,
            connection,
            api_version: api_version.into(),
            sas_ttl_secs,
        })
    }

    pub fn hub(&self) -> &str {
        &self.connection.host_name
    }
}

#[async_trait]
impl DeviceRegistry for HubRegistryClient {
    async fn get_device(&self, device_id: &str) -> Result<Option<DeviceRecord>, RegistryError> {
        let host = &self.connection.host_name;
        let token = SasToken::with_ttl(
            bare_host(host),
            &self.connection.shared_access_key,
            self.connection.shared_access_key_name.as_deref(),
            self.sas_ttl_secs,
        )?;

        let url = format!(
            "{}/devices/{}?api-version={}",
            base_url(host),
            urlencoding::encode(device_id),
            self.api_version
        );

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, token.to_string())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(device = %device_id, "Device not present in hub registry");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let record: DeviceRecord = response.json().await?;
        debug!(device = %record.device_id, status = ?record.status, "Device found in hub registry");
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    const SERVICE_KEY: &str = "c2VydmljZS1wb2xpY3kta2V5";

    async fn lookup(Path(id): Path<String>, headers: HeaderMap) -> axum::response::Response {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !auth.starts_with("SharedAccessSignature sr=127.0.0.1") || !auth.ends_with("&skn=iothubowner") {
            return (AxumStatus::UNAUTHORIZED, "bad token").into_response();
        }
        match id.as_str() {
            "moistureSensor1" => Json(json!({
                "deviceId": "moistureSensor1",
                "status": "enabled",
                "connectionState": "Disconnected"
            }))
            .into_response(),
            "broken" => (AxumStatus::INTERNAL_SERVER_ERROR, "boom").into_response(),
            _ => (AxumStatus::NOT_FOUND, "not found").into_response(),
        }
    }

    async fn registry() -> HubRegistryClient {
        let host = serve(Router::new().route("/devices/{id}", get(lookup))).await;
        let cs = format!(
            "HostName={};SharedAccessKeyName=iothubowner;SharedAccessKey={}",
            host, SERVICE_KEY
        );
        HubRegistryClient::new(reqwest::Client::new(), &cs, "2021-04-12", 60).unwrap()
    }

    #[tokio::test]
    async fn test_existing_device() {
        let record = registry().await.get_device("moistureSensor1").await.unwrap();
        assert_eq!(
            record,
            Some(DeviceRecord {
                device_id: "moistureSensor1".to_string(),
                status: Some("enabled".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let record = registry().await.get_device("moistureSensor9").await.unwrap();
        assert_eq!(record, None);
    }

    #[tokio::test]
    async fn test_server_error() {
        let err = registry().await.get_device("broken").await.unwrap_err();
        assert!(matches!(err, RegistryError::Status { status: 500, .. }));
    }

    #[test]
    fn test_requires_policy_name() {
        let err = HubRegistryClient::new(
            reqwest::Client::new(),
            "HostName=h;DeviceId=d;SharedAccessKey=a2V5",
            "2021-04-12",
            60,
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            RegistryError::ConnectionString(ConnectionStringError::MissingField("SharedAccessKeyName"))
        ));
    }
}
