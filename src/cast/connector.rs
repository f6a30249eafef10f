//! Opens ready-to-use handles to named receivers

use std::sync::Arc;
use std::time::Duration;

use super::discovery::DiscoveryEngine;
use super::session::SessionFactory;
use super::{DeviceDescriptor, DeviceHandle};
use crate::{Error, Result};

/// Connects to receivers found by a [`DiscoveryEngine`]
#[derive(Clone)]
pub struct Connector {
    engine: DiscoveryEngine,
    factory: Arc<dyn SessionFactory>,
    connect_timeout: Duration,
}

impl Connector {
    #[must_use]
    pub fn new(
        engine: DiscoveryEngine,
        factory: Arc<dyn SessionFactory>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            factory,
            connect_timeout,
        }
    }

    #[must_use]
    pub const fn engine(&self) -> &DiscoveryEngine {
        &self.engine
    }

    /// Find a receiver by its advertised name and connect to it
    ///
    /// Returns only once the handle is connected, so commands issued right
    /// after are not dropped by the receiver.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if nothing with that name advertises during
    /// the discovery window, or `Connect` if the handshake fails
    pub async fn connect(&self, raw_name: &str) -> Result<Arc<DeviceHandle>> {
        let descriptor = self
            .engine
            .find(raw_name)
            .await?
            .ok_or_else(|| Error::DeviceNotFound(raw_name.to_string()))?;

        self.connect_descriptor(descriptor).await
    }

    /// Connect to an already discovered receiver
    ///
    /// # Errors
    ///
    /// Returns `Connect` if the handshake fails or times out
    pub async fn connect_descriptor(&self, descriptor: DeviceDescriptor) -> Result<Arc<DeviceHandle>> {
        let session = self.factory.open(&descriptor);
        let handle = Arc::new(DeviceHandle::new(descriptor, session));
        handle.wait_ready(self.connect_timeout).await?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::DeviceState;
    use crate::testing::{FakeBrowser, FakeSessionFactory, cast_service};

    fn connector(browser: FakeBrowser, factory: FakeSessionFactory) -> Connector {
        Connector::new(
            DiscoveryEngine::new(Arc::new(browser), Duration::ZERO),
            Arc::new(factory),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn connect_returns_ready_handle() {
        let browser = FakeBrowser::new(vec![cast_service("Kitchen", "10.0.0.3")]);
        let handle = connector(browser, FakeSessionFactory::new())
            .connect("Kitchen")
            .await
            .unwrap();

        assert_eq!(handle.key(), "kitchen");
        assert_eq!(handle.state(), DeviceState::Ready);
        assert_eq!(handle.descriptor().uri(), "10.0.0.3:8009");
    }

    #[tokio::test]
    async fn missing_device_is_not_found() {
        let browser = FakeBrowser::new(vec![cast_service("Kitchen", "10.0.0.3")]);
        let err = connector(browser, FakeSessionFactory::new())
            .connect("Attic")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(name) if name == "Attic"));
    }

    #[tokio::test]
    async fn unreachable_device_fails_to_connect() {
        let browser = FakeBrowser::new(vec![cast_service("Kitchen", "10.0.0.3")]);
        let factory = FakeSessionFactory::new().unreachable("kitchen");
        let err = connector(browser, factory).connect("Kitchen").await.unwrap_err();
        assert!(matches!(err, Error::Connect(_)));
    }
}
