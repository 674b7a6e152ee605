//! Shared HTTP plumbing for the DPS and IoT Hub clients

use anyhow::{Context, Result};
use std::time::Duration;

/// Base URL for a service host
///
/// Hosts carrying an explicit scheme are used as-is so the clients can be
/// pointed at local endpoints; anything else is assumed to be HTTPS.
pub fn base_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

/// Host without scheme, as used in SAS resource URIs
pub fn bare_host(host: &str) -> &str {
    host.trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
}

/// Build the HTTP client shared by all collaborators
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("soilsense/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}
