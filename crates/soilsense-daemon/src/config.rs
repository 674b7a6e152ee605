//! Configuration loading
//!
//! Tunables come from an optional TOML file. Credentials come from the
//! environment and are only checked for presence.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use soilsense_core::DeviceIdentity;
use soilsense_hub::DpsSettings;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

pub const ENV_PROVISIONING_HOST: &str = "PROVISIONING_HOST";
pub const ENV_ID_SCOPE: &str = "ID_SCOPE";
pub const ENV_GROUP_KEY: &str = "GROUP_ENROLLMENT_PRIMARY_KEY";
pub const ENV_HUB_CONNECTION_STRING: &str = "IOT_HUB_CONNECTION_STRING";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Simulated sensor identities, in display order
    #[serde(default = "default_sensors")]
    pub sensors: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            provisioning: ProvisioningConfig::default(),
            hub: HubConfig::default(),
            http: HttpConfig::default(),
            sensors: default_sensors(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for web server
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// DPS host, used when PROVISIONING_HOST is not set
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_dps_api_version")]
    pub api_version: String,
    /// Delay between registration status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Give up polling after this many attempts
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            host: None,
            api_version: default_dps_api_version(),
            poll_interval_ms: default_poll_interval(),
            max_polls: default_max_polls(),
        }
    }
}

fn default_dps_api_version() -> String {
    "2021-06-01".to_string()
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_max_polls() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_telemetry_api_version")]
    pub telemetry_api_version: String,
    #[serde(default = "default_registry_api_version")]
    pub registry_api_version: String,
    /// Lifetime of generated SAS tokens
    #[serde(default = "default_sas_ttl")]
    pub sas_ttl_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            telemetry_api_version: default_telemetry_api_version(),
            registry_api_version: default_registry_api_version(),
            sas_ttl_secs: default_sas_ttl(),
        }
    }
}

fn default_telemetry_api_version() -> String {
    "2020-03-13".to_string()
}

fn default_registry_api_version() -> String {
    "2021-04-12".to_string()
}

fn default_sas_ttl() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_sensors() -> Vec<String> {
    soilsense_core::default_sensors()
        .into_iter()
        .map(|id| id.0)
        .collect()
}

impl Config {
    /// Reject sensor lists that name the same identity twice
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for sensor in &self.sensors {
            if !seen.insert(sensor.as_str()) {
                bail!("Sensor {} is listed more than once", sensor);
            }
        }
        Ok(())
    }

    pub fn sensor_identities(&self) -> Vec<DeviceIdentity> {
        self.sensors.iter().map(|s| DeviceIdentity::new(s.as_str())).collect()
    }

    pub fn dps_settings(&self) -> DpsSettings {
        DpsSettings {
            api_version: self.provisioning.api_version.clone(),
            poll_interval_ms: self.provisioning.poll_interval_ms,
            max_polls: self.provisioning.max_polls,
            sas_ttl_secs: self.hub.sas_ttl_secs,
        }
    }
}

/// Secrets and endpoints taken from the environment
#[derive(Clone)]
pub struct Credentials {
    pub provisioning_host: String,
    pub id_scope: String,
    pub group_key: String,
    pub hub_connection_string: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("provisioning_host", &self.provisioning_host)
            .field("id_scope", &self.id_scope)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Read credentials from process environment variables
    pub fn from_env(config: &Config) -> Result<Self> {
        Self::from_lookup(config, |name| std::env::var(name).ok())
    }

    /// Read credentials through `lookup`; blank values count as missing
    pub fn from_lookup(config: &Config, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let provisioning_host = get(ENV_PROVISIONING_HOST).or_else(|| config.provisioning.host.clone());

        let mut missing = Vec::new();
        if provisioning_host.is_none() {
            missing.push(ENV_PROVISIONING_HOST);
        }
        let id_scope = get(ENV_ID_SCOPE);
        if id_scope.is_none() {
            missing.push(ENV_ID_SCOPE);
        }
        let group_key = get(ENV_GROUP_KEY);
        if group_key.is_none() {
            missing.push(ENV_GROUP_KEY);
        }
        let hub_connection_string = get(ENV_HUB_CONNECTION_STRING);
        if hub_connection_string.is_none() {
            missing.push(ENV_HUB_CONNECTION_STRING);
        }

        match (provisioning_host, id_scope, group_key, hub_connection_string) {
            (Some(provisioning_host), Some(id_scope), Some(group_key), Some(hub_connection_string)) => {
                Ok(Self {
                    provisioning_host,
                    id_scope,
                    group_key,
                    hub_connection_string,
                })
            }
            _ => bail!("Missing environment variables: {}", missing.join(", ")),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.daemon.bind, "127.0.0.1:5000");
        assert_eq!(config.sensors.len(), 5);
        assert_eq!(config.provisioning.max_polls, 30);
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("soilsense.toml");
        std::fs::write(
            &path,
            r#"
sensors = ["bedA", "bedB"]

[daemon]
bind = "0.0.0.0:8080"

[provisioning]
host = "dps.example.net"
poll_interval_ms = 500
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.daemon.bind, "0.0.0.0:8080");
        assert_eq!(config.sensors, vec!["bedA", "bedB"]);
        assert_eq!(config.provisioning.host.as_deref(), Some("dps.example.net"));
        assert_eq!(config.provisioning.poll_interval_ms, 500);
        assert_eq!(config.provisioning.api_version, "2021-06-01");
        assert_eq!(config.hub.sas_ttl_secs, 3600);
        assert_eq!(config.dps_settings().poll_interval_ms, 500);
    }

    #[test]
    fn test_repeated_sensor_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("soilsense.toml");
        std::fs::write(&path, r#"sensors = ["bedA", "bedA", "bedB"]"#).unwrap();

        let err = load_config(&path).unwrap_err();
        assert_eq!(err.to_string(), "Sensor bedA is listed more than once");
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_credentials_present() {
        let vars = env(&[
            (ENV_PROVISIONING_HOST, "global.azure-devices-provisioning.net"),
            (ENV_ID_SCOPE, "0ne00000001"),
            (ENV_GROUP_KEY, "a2V5"),
            (ENV_HUB_CONNECTION_STRING, "HostName=h;SharedAccessKeyName=p;SharedAccessKey=a2V5"),
        ]);
        let creds = Credentials::from_lookup(&Config::default(), |k| vars.get(k).cloned()).unwrap();
        assert_eq!(creds.id_scope, "0ne00000001");
        assert!(!format!("{:?}", creds).contains("a2V5"));
    }

    #[test]
    fn test_credentials_missing() {
        let vars = env(&[(ENV_ID_SCOPE, "0ne00000001"), (ENV_GROUP_KEY, "  ")]);
        let err = Credentials::from_lookup(&Config::default(), |k| vars.get(k).cloned()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing environment variables: PROVISIONING_HOST, GROUP_ENROLLMENT_PRIMARY_KEY, IOT_HUB_CONNECTION_STRING"
        );
    }

    #[test]
    fn test_provisioning_host_from_file() {
        let mut config = Config::default();
        config.provisioning.host = Some("dps.example.net".to_string());
        let vars = env(&[
            (ENV_ID_SCOPE, "0ne00000001"),
            (ENV_GROUP_KEY, "a2V5"),
            (ENV_HUB_CONNECTION_STRING, "HostName=h;SharedAccessKeyName=p;SharedAccessKey=a2V5"),
        ]);
        let creds = Credentials::from_lookup(&config, |k| vars.get(k).cloned()).unwrap();
        assert_eq!(creds.provisioning_host, "dps.example.net");
    }
}
