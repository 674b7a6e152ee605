//! SoilSense Core - Core types, key derivation and credential formatting
//!
//! This crate provides the foundational types for the SoilSense system:
//! - Per-device symmetric key derivation from a group enrollment key
//! - Device and hub connection string parsing and formatting
//! - Shared access signature (SAS) tokens for DPS and IoT Hub requests
//! - Simulated sensor identities and the telemetry payload they send

pub mod connection;
pub mod device;
pub mod keys;
pub mod sas;

pub use connection::{ConnectionString, ConnectionStringError};
pub use device::{default_sensors, DeviceIdentity, TelemetryPayload};
pub use keys::{derive_device_key, DerivedKey, KeyError};
pub use sas::SasToken;
