//! Application state management

use anyhow::Result;
use soilsense_hub::http::build_client;
use soilsense_hub::{
    DeviceSessionManager, DpsClient, HttpsHubTransport, HubRegistryClient, SessionConfig,
};
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, Credentials};

/// Shared application state
pub struct AppState {
    /// Device session manager (owns the connection-string cache)
    pub manager: Arc<DeviceSessionManager>,
}

impl AppState {
    /// Create application state backed by the real DPS and IoT Hub services
    pub fn new(config: Config, credentials: Credentials) -> Result<Arc<Self>> {
        let client = build_client(config.http.timeout_secs)?;

        let provisioner = Arc::new(DpsClient::new(client.clone(), config.dps_settings()));
        let registry = Arc::new(HubRegistryClient::new(
            client.clone(),
            &credentials.hub_connection_string,
            config.hub.registry_api_version.clone(),
            config.hub.sas_ttl_secs,
        )?);
        let transport = Arc::new(HttpsHubTransport::new(
            client,
            config.hub.telemetry_api_version.clone(),
            config.hub.sas_ttl_secs,
        ));

        info!(
            hub = %registry.hub(),
            dps = %credentials.provisioning_host,
            sensors = config.sensors.len(),
            "Session manager ready"
        );

        let manager = DeviceSessionManager::new(
            SessionConfig {
                provisioning_host: credentials.provisioning_host,
                id_scope: credentials.id_scope,
                group_key: credentials.group_key,
            },
            config.sensor_identities(),
            provisioner,
            registry,
            transport,
        );

        Ok(Self::with_manager(Arc::new(manager)))
    }

    pub fn with_manager(manager: Arc<DeviceSessionManager>) -> Arc<Self> {
        Arc::new(Self { manager })
    }
}
