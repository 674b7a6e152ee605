//! Device Provisioning Service (DPS) registration
//!
//! Registration is an asynchronous operation on the DPS side: the initial
//! `PUT .../register` returns an operation ID with status `assigning`, and
//! the operation is polled until DPS settles on a final status.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use soilsense_core::{DerivedKey, KeyError, SasToken};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::http::base_url;

/// Status DPS reports once a device has been assigned to a hub
pub const STATUS_ASSIGNED: &str = "assigned";

/// Status DPS reports while an assignment is still in progress
const STATUS_ASSIGNING: &str = "assigning";

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("DPS returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to sign registration request: {0}")]
    Signing(#[from] KeyError),
}

/// Input to a single registration
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub host: String,
    pub registration_id: String,
    pub id_scope: String,
    pub symmetric_key: DerivedKey,
}

/// Final state of a registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationResult {
    pub status: String,
    pub assigned_hub: Option<String>,
    pub device_id: Option<String>,
}

impl RegistrationResult {
    pub fn is_assigned(&self) -> bool {
        self.status == STATUS_ASSIGNED
    }
}

/// Registers a device identity with a provisioning service
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn register(&self, request: &RegistrationRequest)
        -> Result<RegistrationResult, ProvisionError>;
}

/// DPS protocol settings
#[derive(Debug, Clone)]
pub struct DpsSettings {
    pub api_version: String,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    pub sas_ttl_secs: u64,
}

impl Default for DpsSettings {
    fn default() -> Self {
        Self {
            api_version: "2021-06-01".to_string(),
            poll_interval_ms: 2000,
            max_polls: 30,
            sas_ttl_secs: soilsense_core::sas::DEFAULT_TTL_SECS,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody<'a> {
    registration_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationStatus {
    operation_id: String,
    status: String,
    #[serde(default)]
    registration_state: Option<RegistrationState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationState {
    #[serde(default)]
    assigned_hub: Option<String>,
    #[serde(default)]
    device_id: Option<String>,
}

/// DPS client speaking the HTTPS registration API
pub struct DpsClient {
    client: reqwest::Client,
    settings: DpsSettings,
}

impl DpsClient {
    pub fn new(client: reqwest::Client, settings: DpsSettings) -> Self {
        Self { client, settings }
    }

    fn registration_url(&self, request: &RegistrationRequest, suffix: &str) -> String {
        format!(
            "{}/{}/registrations/{}/{}?api-version={}",
            base_url(&request.host),
            request.id_scope,
            urlencoding::encode(&request.registration_id),
            suffix,
            self.settings.api_version
        )
    }

    fn authorization(&self, request: &RegistrationRequest) -> Result<String, ProvisionError> {
        let resource = format!(
            "{}/registrations/{}",
            request.id_scope, request.registration_id
        );
        let token = SasToken::with_ttl(
            &resource,
            request.symmetric_key.as_str(),
            Some("registration"),
            self.settings.sas_ttl_secs,
        )?;
        Ok(token.to_string())
    }

    async fn read_status(response: reqwest::Response) -> Result<OperationStatus, ProvisionError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProvisionError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Provisioner for DpsClient {
    async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResult, ProvisionError> {
        let auth = self.authorization(request)?;

        info!(
            registration_id = %request.registration_id,
            host = %request.host,
            "Registering device with DPS"
        );

        let response = self
            .client
            .put(self.registration_url(request, "register"))
            .header(AUTHORIZATION, &auth)
            .json(&RegisterBody {
                registration_id: &request.registration_id,
            })
            .send()
            .await?;
        let mut operation = Self::read_status(response).await?;

        let mut polls = 0;
        while operation.status == STATUS_ASSIGNING && polls < self.settings.max_polls {
            tokio::time::sleep(Duration::from_millis(self.settings.poll_interval_ms)).await;
            polls += 1;

            debug!(
                registration_id = %request.registration_id,
                operation = %operation.operation_id,
                poll = polls,
                "Polling DPS registration operation"
            );

            let suffix = format!("operations/{}", operation.operation_id);
            let response = self
                .client
                .get(self.registration_url(request, &suffix))
                .header(AUTHORIZATION, &auth)
                .send()
                .await?;
            operation = Self::read_status(response).await?;
        }

        let state = operation.registration_state.unwrap_or(RegistrationState {
            assigned_hub: None,
            device_id: None,
        });

        info!(
            registration_id = %request.registration_id,
            status = %operation.status,
            "DPS registration finished"
        );

        Ok(RegistrationResult {
            status: operation.status,
            assigned_hub: state.assigned_hub,
            device_id: state.device_id,
        })
    }
}
