//! Device-to-cloud telemetry sessions
//!
//! A session is opened from a device connection string and follows a
//! connect / send / disconnect lifecycle. Callers must disconnect every
//! session they open, whether or not sending succeeded.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use soilsense_core::{ConnectionString, ConnectionStringError, KeyError, SasToken};
use thiserror::Error;
use tracing::{debug, info};

use crate::http::{bare_host, base_url};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Hub returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid device connection string: {0}")]
    ConnectionString(#[from] ConnectionStringError),
    #[error("Failed to sign hub request: {0}")]
    Signing(#[from] KeyError),
    #[error("Session is not connected")]
    NotConnected,
}

/// One open device session against a hub
#[async_trait]
pub trait HubSession: Send {
    async fn connect(&mut self) -> Result<(), TransportError>;
    async fn send_message(&mut self, payload: &str) -> Result<(), TransportError>;
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// Opens device sessions from connection strings
pub trait HubTransport: Send + Sync {
    fn open(&self, connection_string: &str) -> Result<Box<dyn HubSession>, TransportError>;
}

/// Hub transport using the HTTPS device-to-cloud messages endpoint
pub struct HttpsHubTransport {
    client: reqwest::Client,
    api_version: String,
    sas_ttl_secs: u64,
}

impl HttpsHubTransport {
    pub fn new(client: reqwest::Client, api_version: impl Into<String>, sas_ttl_secs: u64) -> Self {
        Self {
            client,
            api_version: api_version.into(),
            sas_ttl_secs,
        }
    }
}

impl HubTransport for HttpsHubTransport {
    fn open(&self, connection_string: &str) -> Result<Box<dyn HubSession>, TransportError> {
        let connection: ConnectionString = connection_string.parse()?;
        let device_id = connection
            .device_id
            .clone()
            .ok_or(ConnectionStringError::MissingField("DeviceId"))?;

        Ok(Box::new(HttpsHubSession {
            client: self.client.clone(),
            connection,
            device_id,
            api_version: self.api_version.clone(),
            sas_ttl_secs: self.sas_ttl_secs,
            token: None,
        }))
    }
}

struct HttpsHubSession {
    client: reqwest::Client,
    connection: ConnectionString,
    device_id: String,
    api_version: String,
    sas_ttl_secs: u64,
    token: Option<SasToken>,
}

#[async_trait]
impl HubSession for HttpsHubSession {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let resource = format!(
            "{}/devices/{}",
            bare_host(&self.connection.host_name),
            self.device_id
        );
        let token = SasToken::with_ttl(
            &resource,
            &self.connection.shared_access_key,
            None,
            self.sas_ttl_secs,
        )?;

        debug!(
            device = %self.device_id,
            hub = %self.connection.host_name,
            expiry = token.expiry(),
            "Hub session connected"
        );
        self.token = Some(token);
        Ok(())
    }

    async fn send_message(&mut self, payload: &str) -> Result<(), TransportError> {
        let token = self.token.as_ref().ok_or(TransportError::NotConnected)?;

        let url = format!(
            "{}/devices/{}/messages/events?api-version={}",
            base_url(&self.connection.host_name),
            urlencoding::encode(&self.device_id),
            self.api_version
        );

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, token.to_string())
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(device = %self.device_id, bytes = payload.len(), "Telemetry message sent");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.token = None;
        debug!(device = %self.device_id, "Hub session disconnected");
        Ok(())
    }
}
