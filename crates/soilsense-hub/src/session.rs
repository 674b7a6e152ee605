//! Device session management
//!
//! For each simulated sensor the manager derives the device key, checks
//! whether a usable connection string already exists, registers through DPS
//! when it does not, and sends one sample telemetry message. Failures are
//! contained to the device being processed.

use serde::Serialize;
use soilsense_core::{
    derive_device_key, ConnectionString, DerivedKey, DeviceIdentity, KeyError, TelemetryPayload,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::ConnectionCache;
use crate::provisioning::{ProvisionError, Provisioner, RegistrationRequest};
use crate::registry::DeviceRegistry;
use crate::telemetry::{HubSession, HubTransport, TransportError};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Unknown sensor {0}")]
    UnknownDevice(String),
    #[error(transparent)]
    InvalidKeyEncoding(#[from] KeyError),
    #[error("Device {device_id} registration failed with status: {status}")]
    RegistrationFailed { device_id: String, status: String },
    #[error("Provisioning request failed: {0}")]
    ProvisioningUnavailable(#[from] ProvisionError),
    #[error("Telemetry transport failed: {0}")]
    TransportFailure(#[from] TransportError),
    #[error("Connection string is not available for {0}")]
    MissingConnectionString(String),
    #[error("Failed to encode telemetry: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Credentials and endpoints shared by every device session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub provisioning_host: String,
    pub id_scope: String,
    /// Base64 group enrollment primary key
    pub group_key: String,
}

/// Result of processing one sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessOutcome {
    pub sensor: String,
    pub success: bool,
    pub message: String,
}

impl ProcessOutcome {
    fn succeeded(sensor: &str) -> Self {
        Self {
            sensor: sensor.to_string(),
            success: true,
            message: format!("{} successfully connected to DPS and telemetry sent.", sensor),
        }
    }

    fn failed(sensor: &str, error: impl std::fmt::Display) -> Self {
        Self {
            sensor: sensor.to_string(),
            success: false,
            message: format!("Error connecting {} to DPS: {}", sensor, error),
        }
    }
}

/// Sensor name with whether a connection string is cached for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorStatus {
    pub name: String,
    pub connected: bool,
}

pub struct DeviceSessionManager {
    config: SessionConfig,
    sensors: Vec<DeviceIdentity>,
    cache: ConnectionCache,
    provisioner: Arc<dyn Provisioner>,
    registry: Arc<dyn DeviceRegistry>,
    transport: Arc<dyn HubTransport>,
}

impl DeviceSessionManager {
    pub fn new(
        config: SessionConfig,
        sensors: Vec<DeviceIdentity>,
        provisioner: Arc<dyn Provisioner>,
        registry: Arc<dyn DeviceRegistry>,
        transport: Arc<dyn HubTransport>,
    ) -> Self {
        let mut seen = BTreeSet::new();
        let sensors: Vec<DeviceIdentity> = sensors
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        Self {
            cache: ConnectionCache::new(sensors.iter().cloned()),
            config,
            sensors,
            provisioner,
            registry,
            transport,
        }
    }

    /// Known sensors in configuration order, each listed once
    pub fn sensors(&self) -> &[DeviceIdentity] {
        &self.sensors
    }

    pub fn cache(&self) -> &ConnectionCache {
        &self.cache
    }

    pub async fn sensor_status(&self) -> Vec<SensorStatus> {
        let mut status = Vec::with_capacity(self.sensors.len());
        for id in &self.sensors {
            status.push(SensorStatus {
                name: id.to_string(),
                connected: self.cache.get(id).await.is_some(),
            });
        }
        status
    }

    pub fn derive_key(&self, id: &DeviceIdentity) -> Result<DerivedKey, SessionError> {
        Ok(derive_device_key(id.as_str(), &self.config.group_key)?)
    }

    /// Whether `id` can skip registration
    ///
    /// Requires both a registry hit and a cached connection string. A device
    /// the hub knows but this process never registered is reported and
    /// treated as unregistered, since the registry cannot supply its key.
    pub async fn is_registered(&self, id: &DeviceIdentity) -> bool {
        match self.registry.get_device(id.as_str()).await {
            Ok(Some(_)) => {
                if self.cache.get(id).await.is_some() {
                    debug!(device = %id, "Device already registered with cached connection string");
                    true
                } else {
                    warn!(device = %id, "Device is registered but no connection string is cached");
                    false
                }
            }
            Ok(None) => {
                debug!(device = %id, "Device not registered");
                false
            }
            Err(e) => {
                warn!(device = %id, error = %e, "Error checking device registration");
                false
            }
        }
    }

    /// Register `id` with DPS, returning the assigned hub and device ID
    pub async fn register(
        &self,
        id: &DeviceIdentity,
        key: &DerivedKey,
    ) -> Result<(String, String), SessionError> {
        let request = RegistrationRequest {
            host: self.config.provisioning_host.clone(),
            registration_id: id.to_string(),
            id_scope: self.config.id_scope.clone(),
            symmetric_key: key.clone(),
        };

        let result = self.provisioner.register(&request).await?;

        match (result.is_assigned(), result.assigned_hub, result.device_id) {
            (true, Some(hub), Some(device_id)) => {
                info!(device = %id, hub = %hub, assigned_id = %device_id, "Device assigned to hub");
                Ok((hub, device_id))
            }
            _ => Err(SessionError::RegistrationFailed {
                device_id: id.to_string(),
                status: result.status,
            }),
        }
    }

    pub fn build_connection_string(hub: &str, device_id: &str, key: &DerivedKey) -> String {
        ConnectionString::device(hub, device_id, key).to_string()
    }

    pub async fn send_telemetry(
        &self,
        connection_string: &str,
        payload: &TelemetryPayload,
    ) -> Result<(), SessionError> {
        send_telemetry(self.transport.as_ref(), connection_string, payload).await
    }

    /// Run the full workflow for one sensor and describe the result
    pub async fn process(&self, sensor: &str) -> ProcessOutcome {
        let id = DeviceIdentity::from(sensor);
        match self.run(&id).await {
            Ok(()) => {
                info!(device = %id, "Sensor processed");
                ProcessOutcome::succeeded(sensor)
            }
            Err(e) => {
                warn!(device = %id, error = %e, "Sensor processing failed");
                ProcessOutcome::failed(sensor, e)
            }
        }
    }

    /// Process several sensors concurrently, returning outcomes in input order
    pub async fn process_many(self: &Arc<Self>, sensors: &[String]) -> Vec<ProcessOutcome> {
        let handles: Vec<_> = sensors
            .iter()
            .map(|sensor| {
                let manager = Arc::clone(self);
                let task_sensor = sensor.clone();
                let handle = tokio::spawn(async move { manager.process(&task_sensor).await });
                (sensor.clone(), handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (sensor, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => outcomes.push(ProcessOutcome::failed(&sensor, e)),
            }
        }
        outcomes
    }

    async fn run(&self, id: &DeviceIdentity) -> Result<(), SessionError> {
        if !self.cache.is_known(id).await {
            return Err(SessionError::UnknownDevice(id.to_string()));
        }

        let key = self.derive_key(id)?;
        debug!(device = %id, "Derived device key");

        let connection_string = if self.is_registered(id).await {
            self.cache
                .get(id)
                .await
                .ok_or_else(|| SessionError::MissingConnectionString(id.to_string()))?
        } else {
            let (hub, device_id) = self.register(id, &key).await?;
            let connection_string = Self::build_connection_string(&hub, &device_id, &key);
            self.cache.set(id, connection_string.clone()).await;
            connection_string
        };

        let payload = TelemetryPayload::sample(id);
        self.send_telemetry(&connection_string, &payload).await
    }
}

/// Send one message over a fresh hub session
///
/// Once the session is open it is always disconnected, even when connect or
/// send fails. The first error is the one reported.
pub async fn send_telemetry(
    transport: &dyn HubTransport,
    connection_string: &str,
    payload: &TelemetryPayload,
) -> Result<(), SessionError> {
    let body = payload.to_json()?;
    let mut session = transport.open(connection_string)?;

    let sent = deliver(session.as_mut(), &body).await;
    let closed = session.disconnect().await;

    sent?;
    closed?;
    Ok(())
}

async fn deliver(session: &mut dyn HubSession, body: &str) -> Result<(), TransportError> {
    session.connect().await?;
    session.send_message(body).await
}
