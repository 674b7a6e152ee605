//! In-memory connection-string cache
//!
//! Every known identity gets an empty slot at construction. A slot is filled
//! after the first successful registration and stays authoritative for the
//! rest of the process; nothing is persisted across runs.

use soilsense_core::DeviceIdentity;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

pub struct ConnectionCache {
    entries: RwLock<BTreeMap<DeviceIdentity, Option<String>>>,
}

impl ConnectionCache {
    /// Create a cache with an empty slot per identity
    pub fn new(identities: impl IntoIterator<Item = DeviceIdentity>) -> Self {
        Self {
            entries: RwLock::new(identities.into_iter().map(|id| (id, None)).collect()),
        }
    }

    /// Whether `id` is one of the identities the cache was built for
    pub async fn is_known(&self, id: &DeviceIdentity) -> bool {
        self.entries.read().await.contains_key(id)
    }

    /// Cached connection string for `id`, if one has been stored
    pub async fn get(&self, id: &DeviceIdentity) -> Option<String> {
        self.entries.read().await.get(id).cloned().flatten()
    }

    /// Store the connection string for a known identity
    ///
    /// Returns false, leaving the cache untouched, when `id` is unknown.
    pub async fn set(&self, id: &DeviceIdentity, connection_string: String) -> bool {
        match self.entries.write().await.get_mut(id) {
            Some(slot) => {
                *slot = Some(connection_string);
                debug!(device = %id, "Cached connection string");
                true
            }
            None => false,
        }
    }

    /// Identities in order, with whether each has a cached connection string
    pub async fn snapshot(&self) -> Vec<(DeviceIdentity, bool)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(id, cs)| (id.clone(), cs.is_some()))
            .collect()
    }
}
