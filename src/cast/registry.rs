//! Process-wide registry of connected receivers
//!
//! The registry is populated once, on first access or at startup, and then
//! served from cache until [`DeviceRegistry::refresh`] replaces it.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, watch};

use super::connector::Connector;
use super::slug::slugify;
use super::{DeviceDescriptor, DeviceHandle};
use crate::{Error, Result};

/// Normalized device key to connected handle
pub type DeviceMap = BTreeMap<String, Arc<DeviceHandle>>;

#[derive(Clone)]
enum Population {
    Empty,
    Ready(Arc<DeviceMap>),
    /// Discovery failed; lookups keep failing until a refresh succeeds
    Failed(String),
}

/// Cached map of every receiver found on the network
pub struct DeviceRegistry {
    connector: Connector,
    /// Serializes population passes
    populating: Mutex<()>,
    /// Last published population, readable without waiting on a pass
    population: watch::Sender<Population>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new(connector: Connector) -> Self {
        let (population, _) = watch::channel(Population::Empty);
        Self {
            connector,
            populating: Mutex::new(()),
            population,
        }
    }

    /// Populate the registry if it is not populated yet
    ///
    /// Concurrent first callers wait on one discovery pass. Later calls
    /// return the same map.
    ///
    /// # Errors
    ///
    /// Returns `Discovery` if network discovery failed, now or on an
    /// earlier population attempt
    pub async fn initialize(&self) -> Result<Arc<DeviceMap>> {
        let _populating = self.populating.lock().await;
        let current = self.population.borrow().clone();
        match current {
            Population::Ready(map) => Ok(map),
            Population::Failed(reason) => Err(Error::Discovery(reason)),
            Population::Empty => self.populate().await,
        }
    }

    /// Every registered device, populating on first use
    ///
    /// # Errors
    ///
    /// Returns `Discovery` if the registry could not be populated
    pub async fn devices(&self) -> Result<Arc<DeviceMap>> {
        self.initialize().await
    }

    /// Look up one device by key
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no registered device has that key
    pub async fn device(&self, key: &str) -> Result<Arc<DeviceHandle>> {
        let map = self.initialize().await?;
        map.get(&slugify(key))
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound(key.to_string()))
    }

    /// Run discovery again and replace the map
    ///
    /// Devices advertising exactly as before keep their handle and session.
    /// A handle that is replaced finishes its in-flight playback first.
    ///
    /// # Errors
    ///
    /// Returns `Discovery` if network discovery fails
    pub async fn refresh(&self) -> Result<Arc<DeviceMap>> {
        let _populating = self.populating.lock().await;
        self.populate().await
    }

    /// The map, if populated, without triggering discovery
    ///
    /// A refresh in progress does not hide the previous map.
    #[must_use]
    pub fn cached(&self) -> Option<Arc<DeviceMap>> {
        match &*self.population.borrow() {
            Population::Ready(map) => Some(map.clone()),
            _ => None,
        }
    }

    /// Reason the last population failed, if it did
    #[must_use]
    pub fn discovery_error(&self) -> Option<String> {
        match &*self.population.borrow() {
            Population::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Caller must hold `populating`
    async fn populate(&self) -> Result<Arc<DeviceMap>> {
        let descriptors = match self.connector.engine().discover().await {
            Ok(descriptors) => descriptors,
            Err(e) => {
                tracing::error!(error = %e, "device discovery failed");
                self.population.send_replace(Population::Failed(e.to_string()));
                return Err(e);
            }
        };

        let previous = self.cached().unwrap_or_default();
        let connects = descriptors.into_iter().map(|descriptor| {
            let existing = reusable(&previous, &descriptor);
            async move {
                let name = descriptor.friendly_name.clone();
                let result = match existing {
                    Some(handle) => Ok(handle),
                    None => self.connector.connect_descriptor(descriptor).await,
                };
                (name, result)
            }
        });

        let mut map = DeviceMap::new();
        for (name, result) in join_all(connects).await {
            match result {
                Ok(handle) => {
                    let key = handle.key().to_string();
                    if let Some(previous) = map.insert(key.clone(), handle) {
                        tracing::warn!(
                            key = %key,
                            previous = %previous.descriptor().friendly_name,
                            current = %name,
                            "duplicate device key, keeping the last device"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(device = %name, error = %e, "skipping device that failed to connect");
                }
            }
        }

        // Let playback on handles being replaced finish before the new map is visible
        let mut retired = Vec::new();
        for (key, old) in &*previous {
            if !map.get(key).is_some_and(|new| Arc::ptr_eq(new, old)) {
                retired.push(old.lock_dispatch().await);
            }
        }

        tracing::info!(count = map.len(), retired = retired.len(), "device registry populated");
        let map = Arc::new(map);
        self.population.send_replace(Population::Ready(map.clone()));
        Ok(map)
    }
}

/// Handle from the previous map for a device that advertises unchanged
fn reusable(previous: &DeviceMap, descriptor: &DeviceDescriptor) -> Option<Arc<DeviceHandle>> {
    previous
        .get(&descriptor.key)
        .filter(|handle| handle.descriptor() == descriptor)
        .cloned()
}
