//! Simulated sensor identities and telemetry

use serde::{Deserialize, Serialize};

/// Logical name of a simulated sensor, also used as its DPS registration ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(pub String);

impl DeviceIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceIdentity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The five moisture sensors known out of the box
pub fn default_sensors() -> Vec<DeviceIdentity> {
    (1..=5)
        .map(|n| DeviceIdentity(format!("moistureSensor{}", n)))
        .collect()
}

/// Sample reading sent upstream by every simulated sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    pub temperature: f64,
    pub humidity: u32,
    pub sensor_name: String,
}

impl TelemetryPayload {
    pub fn sample(sensor: &DeviceIdentity) -> Self {
        Self {
            temperature: 22.0,
            humidity: 55,
            sensor_name: sensor.0.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sensors() {
        let sensors = default_sensors();
        assert_eq!(sensors.len(), 5);
        assert_eq!(sensors[0].as_str(), "moistureSensor1");
        assert_eq!(sensors[4].as_str(), "moistureSensor5");
    }

    #[test]
    fn test_sample_payload_json() {
        let payload = TelemetryPayload::sample(&DeviceIdentity::from("moistureSensor2"));
        assert_eq!(
            payload.to_json().unwrap(),
            r#"{"temperature":22.0,"humidity":55,"sensor_name":"moistureSensor2"}"#
        );
    }
}
