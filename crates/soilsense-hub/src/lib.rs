//! SoilSense Hub - Device provisioning and telemetry against Azure IoT
//!
//! This crate provides:
//! - Collaborator traits for DPS provisioning, hub registry queries and
//!   device-to-cloud telemetry, plus HTTPS implementations of each
//! - The in-memory connection-string cache
//! - The device session manager that drives key derivation, registration
//!   and telemetry for one or many simulated sensors

pub mod cache;
pub mod http;
pub mod provisioning;
pub mod registry;
pub mod session;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::ConnectionCache;
pub use provisioning::{
    DpsClient, DpsSettings, ProvisionError, Provisioner, RegistrationRequest, RegistrationResult,
    STATUS_ASSIGNED,
};
pub use registry::{DeviceRecord, DeviceRegistry, HubRegistryClient, RegistryError};
pub use session::{
    send_telemetry, DeviceSessionManager, ProcessOutcome, SensorStatus, SessionConfig, SessionError,
};
pub use telemetry::{HttpsHubTransport, HubSession, HubTransport, TransportError};
